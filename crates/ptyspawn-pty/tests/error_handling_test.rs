//! Error handling tests for spawn setup

#[cfg(unix)]
mod unix_tests {
    use ptyspawn_pty::allocator::classify_open_failure;
    use ptyspawn_pty::{
        Errno, PosixPtyAllocator, ProcessTable, PtyAllocator, PtyError, PtySession, SpawnError,
        SpawnOptions, Spawner,
    };
    use ptyspawn_test_utils::CappedAllocator;
    use std::path::Path;

    /// Hands out a real master paired with a slave name that does not exist.
    struct MissingSlave;

    impl PtyAllocator for MissingSlave {
        fn allocate(&self) -> Result<PtySession, PtyError> {
            let pty = PosixPtyAllocator::new().allocate()?;
            Ok(PtySession::new(pty.into_master(), "/nonexistent/tty"))
        }
    }

    #[test]
    fn test_zero_capacity_pool() {
        let spawner = Spawner::with_allocator(CappedAllocator::new(0));
        let mut table = ProcessTable::new();
        let err = spawner
            .spawn(&mut table, &["/bin/true"], &SpawnOptions::default())
            .unwrap_err();
        assert!(matches!(err, SpawnError::Pty(PtyError::Exhausted)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_resource_limit_distinguished() {
        let err = classify_open_failure(Errno::EMFILE, Path::new("/nonexistent/control"));
        assert!(matches!(err, PtyError::ResourceLimit(Errno::EMFILE)));
        assert!(err.to_string().contains("file descriptors"));
    }

    #[test]
    fn test_child_setup_failure_reported() {
        let spawner = Spawner::with_allocator(MissingSlave);
        let mut table = ProcessTable::new();
        let err = spawner
            .spawn(&mut table, &["/bin/true"], &SpawnOptions::default())
            .unwrap_err();
        assert!(matches!(err, SpawnError::Bootstrap(Errno::ENOENT)), "{err:?}");
        assert!(table.is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        let mut table = ProcessTable::new();
        let spawner = Spawner::new();

        let empty: [&str; 0] = [];
        assert!(matches!(
            spawner.spawn(&mut table, &empty, &SpawnOptions::default()),
            Err(SpawnError::InvalidCommand(_))
        ));
        assert!(matches!(
            spawner.spawn(&mut table, &["/bin/echo", "nul\0byte"], &SpawnOptions::default()),
            Err(SpawnError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_exec_error_message() {
        let mut table = ProcessTable::new();
        let err = Spawner::new()
            .spawn(&mut table, &["/nonexistent/path"], &SpawnOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("No such file or directory"), "{err}");
    }
}
