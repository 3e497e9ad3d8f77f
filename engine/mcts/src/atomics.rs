//! Lock-free floating point accumulation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe `f64` built on a CAS loop over the IEEE-754 bit pattern in an
/// `AtomicU64`. Accumulators on search nodes use this so that backups from
/// many workers never take a lock.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.bits.load(ordering))
    }

    #[inline]
    pub fn store(&self, value: f64, ordering: Ordering) {
        self.bits.store(value.to_bits(), ordering);
    }

    /// Lock-free fetch-add; returns the previous value.
    #[inline]
    pub fn fetch_add(&self, value: f64, ordering: Ordering) -> f64 {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, ordering, Ordering::Relaxed)
            {
                Ok(_) => return f64::from_bits(current),
                Err(observed) => current = observed,
            }
        }
    }
}
