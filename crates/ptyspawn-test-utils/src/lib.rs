pub mod allocator;
pub mod fixtures;
pub mod output;

pub use allocator::CappedAllocator;
pub use fixtures::TestFixtures;
pub use output::{collect_output, reap_until};

use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("ptyspawn=debug,ptyspawn_pty=debug")),
            )
            .with_test_writer()
            .init();
    });
}

/// Upper bound for anything a test waits on a child for
pub const CHILD_TIMEOUT: Duration = Duration::from_secs(10);
