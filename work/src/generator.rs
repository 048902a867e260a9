//! PoW generation (multi-threaded CPU).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rayon::prelude::*;

use crate::validator::work_value;
use crate::{WorkError, WorkNonce};
use troll_types::BlockHash;

/// Something that can search the nonce space for a root.
///
/// The cache is written against this trait so tests can substitute a solver
/// that counts invocations or never finishes.
pub trait WorkSolver: Send + Sync + 'static {
    /// Find a nonce for `root` meeting `min_difficulty`, giving up with
    /// [`WorkError::Cancelled`] once `cancel` is set.
    fn solve(
        &self,
        root: &BlockHash,
        min_difficulty: u64,
        cancel: &AtomicBool,
    ) -> Result<WorkNonce, WorkError>;
}

/// Generates proof-of-work using all available CPU cores.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkGenerator;

/// Batch size per thread before checking the stop flags.
const BATCH_SIZE: u64 = 4096;

/// Nothing found yet. `u64::MAX` is never reported as a solution.
const NOT_FOUND: u64 = u64::MAX;

impl WorkGenerator {
    /// Generate a work nonce that meets the minimum difficulty.
    pub fn generate(&self, root: &BlockHash, min_difficulty: u64) -> Result<WorkNonce, WorkError> {
        self.generate_cancellable(root, min_difficulty, &AtomicBool::new(false))
    }

    /// Generate a work nonce, stopping early when `cancel` is raised.
    ///
    /// Splits the nonce space across all rayon threads with a stride equal to
    /// the thread count. The first thread to find a valid nonce signals the
    /// others to stop.
    pub fn generate_cancellable(
        &self,
        root: &BlockHash,
        min_difficulty: u64,
        cancel: &AtomicBool,
    ) -> Result<WorkNonce, WorkError> {
        if min_difficulty == 0 {
            return Ok(WorkNonce(0));
        }

        let found = AtomicU64::new(NOT_FOUND);
        let num_threads = rayon::current_num_threads().max(1);
        let stride = num_threads as u64;

        (0..num_threads).into_par_iter().for_each(|thread_id| {
            let mut nonce = thread_id as u64;
            loop {
                if found.load(Ordering::Relaxed) != NOT_FOUND || cancel.load(Ordering::Relaxed) {
                    return;
                }

                for _ in 0..BATCH_SIZE {
                    if nonce != NOT_FOUND && work_value(root, nonce) >= min_difficulty {
                        found.store(nonce, Ordering::Relaxed);
                        return;
                    }
                    nonce = nonce.wrapping_add(stride);
                }
            }
        });

        match found.load(Ordering::Relaxed) {
            NOT_FOUND => Err(WorkError::Cancelled),
            nonce => Ok(WorkNonce(nonce)),
        }
    }
}

impl WorkSolver for WorkGenerator {
    fn solve(
        &self,
        root: &BlockHash,
        min_difficulty: u64,
        cancel: &AtomicBool,
    ) -> Result<WorkNonce, WorkError> {
        self.generate_cancellable(root, min_difficulty, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate_work;

    #[test]
    fn generated_work_validates() {
        let root = BlockHash::new([0x42; 32]);
        let nonce = WorkGenerator.generate(&root, 1_000_000).unwrap();
        assert!(validate_work(&root, nonce.0, 1_000_000));
    }

    #[test]
    fn zero_difficulty_short_circuits() {
        let nonce = WorkGenerator.generate(&BlockHash::ZERO, 0).unwrap();
        assert_eq!(nonce, WorkNonce(0));
    }

    #[test]
    fn raised_cancel_flag_stops_search() {
        let cancel = AtomicBool::new(true);
        let result = WorkGenerator.generate_cancellable(&BlockHash::ZERO, u64::MAX, &cancel);
        assert_eq!(result, Err(WorkError::Cancelled));
    }

    #[test]
    fn cancel_from_another_thread() {
        let cancel = std::sync::Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let handle = std::thread::spawn(move || {
            WorkGenerator.generate_cancellable(&BlockHash::new([9u8; 32]), u64::MAX, &flag)
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        cancel.store(true, Ordering::Relaxed);
        assert_eq!(handle.join().unwrap(), Err(WorkError::Cancelled));
    }
}
