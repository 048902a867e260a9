//! Block-kind-aware PoW difficulty thresholds.
//!
//! - Send and change blocks spend from or re-point an existing chain and need
//!   the full base difficulty.
//! - Receive (and open) blocks only credit the account and need 1/64 of it.
//!
//! Work precomputed for an account's frontier is generated at the highest of
//! the two, so it is valid whatever the next block turns out to be.

use serde::{Deserialize, Serialize};

/// Simplified block kind for PoW threshold selection.
///
/// Kept separate from the ledger's block kind so this crate does not depend
/// on block construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkBlockKind {
    /// Send or change-representative.
    SendOrChange,
    /// Receive, including the opening receive of a new account.
    Receive,
}

const BASE_THRESHOLD: u64 = 0xFFFFFFF8_00000000;
const RECEIVE_MULTIPLIER: f64 = 1.0 / 64.0;

/// Per-block-kind PoW thresholds.
///
/// Higher threshold values = harder work required.  The `multiply` helper
/// scales difficulty through the "inverse gap" (`2^64 - threshold`):
/// multipliers above 1 raise the bar, multipliers below 1 lower it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkThresholds {
    pub base: u64,
    pub receive_multiplier: f64,
}

impl WorkThresholds {
    pub fn new() -> Self {
        Self::with_base(BASE_THRESHOLD)
    }

    /// Construct with a custom base (useful in tests or low-difficulty devnets).
    pub fn with_base(base: u64) -> Self {
        Self {
            base,
            receive_multiplier: RECEIVE_MULTIPLIER,
        }
    }

    /// Get the required work difficulty for a specific block kind.
    pub fn threshold_for(&self, kind: WorkBlockKind) -> u64 {
        match kind {
            WorkBlockKind::SendOrChange => self.base,
            WorkBlockKind::Receive => self.multiply(self.base, self.receive_multiplier),
        }
    }

    /// The threshold precomputed work must meet to serve any block kind.
    pub fn highest(&self) -> u64 {
        self.threshold_for(WorkBlockKind::SendOrChange)
            .max(self.threshold_for(WorkBlockKind::Receive))
    }

    /// When `base` is 0 (PoW disabled), all derived thresholds are also 0.
    fn multiply(&self, base: u64, multiplier: f64) -> u64 {
        if base == 0 {
            return 0;
        }
        let difficulty_inv = base.wrapping_neg();
        let scaled_inv = (difficulty_inv as f64 / multiplier).min(u64::MAX as f64) as u64;
        scaled_inv.wrapping_neg()
    }
}

impl Default for WorkThresholds {
    fn default() -> Self {
        Self::new()
    }
}
