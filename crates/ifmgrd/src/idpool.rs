//! Id-allocation service contract and in-memory pool.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use ifm_common::IfmResult;

/// Pool the per-interface lport tags are drawn from.
pub const IF_INDEX_POOL: &str = "interface-names";

/// External id-allocation service.
///
/// `allocate_id` must be idempotent per key: asking again for a key whose id
/// is already allocated returns the same id. The engine re-derives the lport
/// tag on every reconciliation pass instead of caching allocation success.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// Allocates (or returns the existing) id for a key.
    async fn allocate_id(&self, pool: &str, key: &str) -> IfmResult<u32>;

    /// Releases the id held by a key. Releasing an absent key is a no-op.
    async fn release_id(&self, pool: &str, key: &str) -> IfmResult<()>;
}

/// In-memory id pool used by the daemon scaffold and tests.
pub struct MemIdAllocator {
    ids: DashMap<(String, String), u32>,
    next: AtomicU32,
}

impl MemIdAllocator {
    /// Creates a pool whose ids start at 1.
    pub fn new() -> Self {
        Self {
            ids: DashMap::new(),
            next: AtomicU32::new(1),
        }
    }

    /// Returns the number of live allocations.
    pub fn allocated_count(&self) -> usize {
        self.ids.len()
    }
}

impl Default for MemIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdAllocator for MemIdAllocator {
    async fn allocate_id(&self, pool: &str, key: &str) -> IfmResult<u32> {
        let id = *self
            .ids
            .entry((pool.to_string(), key.to_string()))
            .or_insert_with(|| self.next.fetch_add(1, Ordering::SeqCst));
        debug!("Allocated id {} for {}/{}", id, pool, key);
        Ok(id)
    }

    async fn release_id(&self, pool: &str, key: &str) -> IfmResult<()> {
        if self
            .ids
            .remove(&(pool.to_string(), key.to_string()))
            .is_some()
        {
            debug!("Released id for {}/{}", pool, key);
        }
        Ok(())
    }
}
