// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scalar resource accounting for running tasks.

use tarn_protocol::task::ResourceVector;
use tracing::warn;

/// Tracks the CPU/GPU slots still available on this node.
///
/// Invariant: `available` is component-wise within `[0, capacity]`. Debits
/// are refused rather than allowed to go negative.
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    capacity: ResourceVector,
    available: ResourceVector,
}

impl ResourceLedger {
    pub fn new(capacity: ResourceVector) -> Self {
        Self {
            capacity,
            available: capacity,
        }
    }

    pub fn capacity(&self) -> ResourceVector {
        self.capacity
    }

    pub fn available(&self) -> ResourceVector {
        self.available
    }

    /// Whether `demand` fits in the currently available slots.
    pub fn fits(&self, demand: ResourceVector) -> bool {
        demand.cpus <= self.available.cpus && demand.gpus <= self.available.gpus
    }

    /// Reserve `demand`. Returns false (and changes nothing) if it does not fit.
    pub fn debit(&mut self, demand: ResourceVector) -> bool {
        if !self.fits(demand) {
            return false;
        }
        self.available.cpus -= demand.cpus;
        self.available.gpus -= demand.gpus;
        true
    }

    /// Return `demand` to the pool.
    pub fn credit(&mut self, demand: ResourceVector) {
        self.available.cpus += demand.cpus;
        self.available.gpus += demand.gpus;
        if self.available.cpus > self.capacity.cpus || self.available.gpus > self.capacity.gpus {
            warn!(
                available = %self.available,
                capacity = %self.capacity,
                "Resource ledger credited past capacity, clamping"
            );
            self.available.cpus = self.available.cpus.min(self.capacity.cpus);
            self.available.gpus = self.available.gpus.min(self.capacity.gpus);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_and_credit_restore_capacity() {
        let mut ledger = ResourceLedger::new(ResourceVector::new(4, 1));
        let demand = ResourceVector::new(2, 1);

        assert!(ledger.debit(demand));
        assert_eq!(ledger.available(), ResourceVector::new(2, 0));

        ledger.credit(demand);
        assert_eq!(ledger.available(), ledger.capacity());
    }

    #[test]
    fn test_debit_refuses_when_short() {
        let mut ledger = ResourceLedger::new(ResourceVector::new(2, 0));

        assert!(!ledger.debit(ResourceVector::new(3, 0)));
        assert!(!ledger.debit(ResourceVector::new(1, 1)));
        // Refused debits leave the ledger untouched.
        assert_eq!(ledger.available(), ResourceVector::new(2, 0));

        assert!(ledger.debit(ResourceVector::new(2, 0)));
        assert!(!ledger.debit(ResourceVector::new(1, 0)));
    }

    #[test]
    fn test_zero_demand_always_fits() {
        let mut ledger = ResourceLedger::new(ResourceVector::new(0, 0));
        assert!(ledger.fits(ResourceVector::default()));
        assert!(ledger.debit(ResourceVector::default()));
        assert_eq!(ledger.available(), ResourceVector::new(0, 0));
    }

    #[test]
    fn test_credit_clamps_at_capacity() {
        let mut ledger = ResourceLedger::new(ResourceVector::new(2, 1));
        ledger.credit(ResourceVector::new(5, 5));
        assert_eq!(ledger.available(), ledger.capacity());
    }
}
