use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestFixtures {
    temp_dir: TempDir,
}

impl TestFixtures {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write an executable script.
    pub fn create_test_script(&self, name: &str, content: &str) -> Result<PathBuf> {
        let script_path = self.create_test_file(name, content.as_bytes())?;

        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms)?;

        Ok(script_path)
    }

    pub fn create_test_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let file_path = self.temp_dir.path().join(name);
        std::fs::write(&file_path, content)?;
        Ok(file_path)
    }
}
