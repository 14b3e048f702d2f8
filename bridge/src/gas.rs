//! Gas accounting shared between the host transaction, the VM and the
//! protocol core.
//!
//! One meter spans a whole transaction. Every callback receives an
//! allowance derived from the remaining budget, and the VM-reported
//! consumption is deducted before control returns to the core. Storage
//! access through the contract host charges the same meter.

use crate::error::BridgeError;

/// Flat cost charged for every contract storage read.
pub const GAS_COST_STORAGE_READ: u64 = 1_000;
/// Flat cost charged for every contract storage write or delete.
pub const GAS_COST_STORAGE_WRITE: u64 = 2_000;
/// Additional per-byte cost for values read from contract storage.
pub const GAS_COST_PER_BYTE_READ: u64 = 3;
/// Additional per-byte cost for values written to contract storage.
pub const GAS_COST_PER_BYTE_WRITE: u64 = 30;

/// Tracks gas spent by a single transaction across every callback it
/// triggers.
#[derive(Debug)]
pub struct GasMeter {
    limit: u64,
    consumed: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        GasMeter { limit, consumed: 0 }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Budget left for the next callback.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.consumed)
    }

    /// Deduct `amount`, failing once the budget is exceeded. The meter is
    /// left saturated so every later charge keeps failing.
    pub fn consume(&mut self, amount: u64) -> Result<(), BridgeError> {
        let attempted = self.consumed.saturating_add(amount);
        if attempted > self.limit {
            self.consumed = self.limit;
            return Err(BridgeError::OutOfGas {
                limit: self.limit,
                attempted,
            });
        }
        self.consumed = attempted;
        Ok(())
    }
}
