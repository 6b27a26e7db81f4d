use std::sync::atomic::{AtomicBool, Ordering};

use flowlens_types::Architecture;

/// One operation at a time per architecture.
#[derive(Debug, Default)]
pub struct OperationSlots {
    federated: AtomicBool,
    projected: AtomicBool,
}

/// Releases its slot when dropped.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl OperationSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, architecture: Architecture) -> &AtomicBool {
        match architecture {
            Architecture::SyncFederated => &self.federated,
            Architecture::AsyncProjected => &self.projected,
        }
    }

    /// `None` while another operation holds the slot.
    pub fn try_acquire(&self, architecture: Architecture) -> Option<SlotGuard<'_>> {
        let flag = self.flag(architecture);
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard { flag })
    }

    pub fn is_busy(&self, architecture: Architecture) -> bool {
        self.flag(architecture).load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_exclusive_until_guard_drops() {
        let slots = OperationSlots::new();
        let guard = slots.try_acquire(Architecture::AsyncProjected).expect("free slot");
        assert!(slots.is_busy(Architecture::AsyncProjected));
        assert!(slots.try_acquire(Architecture::AsyncProjected).is_none());
        assert!(slots.try_acquire(Architecture::SyncFederated).is_some());

        drop(guard);
        assert!(!slots.is_busy(Architecture::AsyncProjected));
        assert!(slots.try_acquire(Architecture::AsyncProjected).is_some());
    }
}
