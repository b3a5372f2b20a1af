use ptyspawn_pty::{PosixPtyAllocator, PtyAllocator, PtyError, PtySession};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Allocator that hands out at most `cap` ptys, then reports exhaustion
pub struct CappedAllocator<A = PosixPtyAllocator> {
    inner: A,
    cap: usize,
    handed_out: AtomicUsize,
}

impl CappedAllocator {
    pub fn new(cap: usize) -> Self {
        Self::wrap(PosixPtyAllocator::new(), cap)
    }
}

impl<A: PtyAllocator> CappedAllocator<A> {
    pub fn wrap(inner: A, cap: usize) -> Self {
        Self {
            inner,
            cap,
            handed_out: AtomicUsize::new(0),
        }
    }

    pub fn handed_out(&self) -> usize {
        self.handed_out.load(Ordering::SeqCst)
    }
}

impl<A: PtyAllocator> PtyAllocator for CappedAllocator<A> {
    fn allocate(&self) -> Result<PtySession, PtyError> {
        let claimed = self
            .handed_out
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.cap).then_some(n + 1)
            });
        if claimed.is_err() {
            return Err(PtyError::Exhausted);
        }
        self.inner.allocate()
    }
}
