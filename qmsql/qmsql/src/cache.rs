//! Compiled plans, shared between threads.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::CompiledQuery;

/// Maps a fingerprint (see [crate::fingerprint]) to a compiled plan.
///
/// Lookups are safe under concurrent access, but compilation is not
/// serialized: two threads that miss on the same key both compile, and the
/// later insert replaces the earlier one. Both plans are equal.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<u64, Arc<CompiledQuery>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: u64) -> Option<Arc<CompiledQuery>> {
        let plans = self.plans.read().unwrap();
        plans.get(&key).cloned()
    }

    pub fn insert(&self, key: u64, plan: Arc<CompiledQuery>) {
        let mut plans = self.plans.write().unwrap();
        if plans.insert(key, plan).is_some() {
            log::debug!("plan {key:016x} compiled twice");
        }
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.plans.write().unwrap().clear();
    }
}
