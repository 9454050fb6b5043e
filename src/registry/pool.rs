//! Category pools.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::registry::instance::Instance;

/// The instances registered under one category, in load order.
#[derive(Debug)]
pub struct CategoryPool {
    pub category: String,
    instances: Vec<Arc<Instance>>,
    cursor: AtomicUsize,
}

impl CategoryPool {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            instances: Vec::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&mut self, instance: Arc<Instance>) {
        self.instances.push(instance);
    }

    /// Start the round-robin cursor where a previous pool left off.
    pub(crate) fn resume_from(&self, previous: &CategoryPool) {
        self.cursor
            .store(previous.cursor.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    pub fn instances(&self) -> &[Arc<Instance>] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Advance the round-robin cursor, returning its previous value.
    pub fn advance_cursor(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed)
    }
}
