/// Output-write arbitration for speculative execution
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const UNCLAIMED: u64 = 0;

static NEXT_COORDINATOR_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one coordinator instance, used as the arbitration token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinatorId(NonZeroU64);

impl CoordinatorId {
    /// Allocate a process-wide unique id
    pub fn next() -> Self {
        let raw = NEXT_COORDINATOR_ID.fetch_add(1, Ordering::Relaxed);
        // Counter starts at 1 and would need 2^64 allocations to wrap
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for CoordinatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "coordinator-{}", self.0)
    }
}

/// Single-claim cell shared by all attempts racing on one spawn
///
/// Starts unclaimed. The first [`try_claim`](Self::try_claim) wins for good;
/// later claims succeed only for the winner.
#[derive(Debug, Default)]
pub struct ArbitrationSlot {
    owner: AtomicU64,
}

impl ArbitrationSlot {
    pub fn new() -> Self {
        Self {
            owner: AtomicU64::new(UNCLAIMED),
        }
    }

    /// New slot ready to be handed to every racer
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Claim the slot for `id`; true if `id` now owns it (or already did)
    pub fn try_claim(&self, id: CoordinatorId) -> bool {
        match self
            .owner
            .compare_exchange(UNCLAIMED, id.get(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == id.get(),
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.owner.load(Ordering::Acquire) != UNCLAIMED
    }

    pub fn winner(&self) -> Option<CoordinatorId> {
        NonZeroU64::new(self.owner.load(Ordering::Acquire)).map(CoordinatorId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_coordinator_ids_are_unique() {
        let a = CoordinatorId::next();
        let b = CoordinatorId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn test_first_claim_wins() {
        let slot = ArbitrationSlot::new();
        let winner = CoordinatorId::next();
        let loser = CoordinatorId::next();

        assert!(!slot.is_claimed());
        assert!(slot.try_claim(winner));
        assert!(!slot.try_claim(loser));
        assert!(slot.try_claim(winner));
        assert_eq!(slot.winner(), Some(winner));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let slot = ArbitrationSlot::shared();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let id = CoordinatorId::next();
                    barrier.wait();
                    slot.try_claim(id)
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
