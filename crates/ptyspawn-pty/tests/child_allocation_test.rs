//! The forked child must not touch the heap between fork and exec. An
//! allocation made there can deadlock on a lock another thread of the
//! parent held at fork time.

#[cfg(unix)]
mod unix_tests {
    use ptyspawn_pty::{ExitStatus, ProcessTable, SpawnOptions, Spawner};
    use std::alloc::{GlobalAlloc, Layout, System};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Exit code of a child that allocated after its close hook ran
    const ALLOCATED_IN_CHILD: i32 = 99;

    static FORBID_ALLOC: AtomicBool = AtomicBool::new(false);

    struct ExitOnAlloc;

    unsafe impl GlobalAlloc for ExitOnAlloc {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            if FORBID_ALLOC.load(Ordering::Relaxed) {
                libc::_exit(ALLOCATED_IN_CHILD);
            }
            System.alloc(layout)
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            System.dealloc(ptr, layout)
        }
    }

    #[global_allocator]
    static GLOBAL: ExitOnAlloc = ExitOnAlloc;

    fn spawn_and_wait(argv: &[&str]) -> ExitStatus {
        // the flag is only ever set in the forked child
        let options =
            SpawnOptions::new().close_hook(|| FORBID_ALLOC.store(true, Ordering::Relaxed));
        let mut table = ProcessTable::new();
        let record = Spawner::new().spawn(&mut table, argv, &options).unwrap();
        table.wait(record.pid()).unwrap()
    }

    #[test]
    fn test_no_allocation_before_exec() {
        assert_eq!(spawn_and_wait(&["/bin/true"]), ExitStatus::Exited(0));
    }

    #[test]
    fn test_no_allocation_with_arguments() {
        assert_eq!(
            spawn_and_wait(&["/bin/sh", "-c", "exit 6", "sh", "extra"]),
            ExitStatus::Exited(6)
        );
    }
}
