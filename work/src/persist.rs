//! Serializable form of cached work, written alongside wallet state.

use serde::{Deserialize, Serialize};
use troll_types::BlockHash;

use crate::WorkNonce;

/// One cache entry as stored on disk. Revalidated on load by
/// [`WorkCache::restore`](crate::WorkCache::restore).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedWork {
    pub root: BlockHash,
    pub work: WorkNonce,
}
