#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let code = ptyspawn::cli::run().await?;

    // Exit without waiting on the stdin reader thread
    use std::io::{self, Write};
    let _ = io::stderr().flush();
    let _ = io::stdout().flush();
    std::process::exit(code)
}
