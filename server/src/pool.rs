//! Resource pool handing out image indices without repeats
//!
//! Every resource is drawn at most once per generation. When the available
//! set runs dry the pool refills itself and a new generation starts, so
//! repeats only ever happen across generations. Resources are never given
//! back early: a finished drag gesture keeps its resource marked as used.

use log::{debug, info};
use rand::Rng;
use shared::ResourceId;
use std::collections::HashSet;

/// Partition of `[0, size)` into resources still available this generation
/// and resources already handed out
#[derive(Debug, Clone)]
pub struct ResourcePool {
    size: u32,
    available: Vec<ResourceId>,
    used: HashSet<ResourceId>,
    generation: u64,
}

impl ResourcePool {
    pub fn new(size: u32) -> Self {
        let mut pool = Self {
            size: 0,
            available: Vec::new(),
            used: HashSet::new(),
            generation: 0,
        };
        pool.initialize(size);
        pool
    }

    /// Resets the pool to `available = [0, size)` and `used = {}`
    pub fn initialize(&mut self, size: u32) {
        self.size = size;
        self.generation = 0;
        self.refill();
        info!("Resource pool initialized with {} resources", size);
    }

    fn refill(&mut self) {
        self.available = (0..self.size).map(ResourceId).collect();
        self.used.clear();
    }

    /// Hands out a uniformly random resource not yet used this generation
    ///
    /// Starts a new generation first if every resource has been used.
    /// Returns `None` only when the pool is empty (no assets discovered).
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<ResourceId> {
        if self.size == 0 {
            return None;
        }

        if self.available.is_empty() {
            self.refill();
            self.generation += 1;
            info!(
                "Resource pool exhausted, starting generation {}",
                self.generation
            );
        }

        let index = rng.gen_range(0..self.available.len());
        let resource = self.available.swap_remove(index);
        self.used.insert(resource);

        debug!(
            "Selected resource {}. {} resources remaining",
            resource,
            self.available.len()
        );
        Some(resource)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn available_len(&self) -> usize {
        self.available.len()
    }

    pub fn used_len(&self) -> usize {
        self.used.len()
    }

    pub fn is_used(&self, resource: ResourceId) -> bool {
        self.used.contains(&resource)
    }

    /// Number of completed refills since the last `initialize`
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new(0)
    }
}
