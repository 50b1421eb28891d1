use std::sync::atomic::{AtomicBool, Ordering};

/// Holds a busy flag for as long as it lives
///
/// The flag is released on drop, so a cancelled update or swap never leaves
/// it set.
pub(super) struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    /// Set the flag, or return `None` if it is already set
    pub(super) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
