//! Named counters for structural ECS events

use std::collections::HashMap;

/// Monotonic event counters keyed by static names.
#[derive(Debug, Default)]
pub struct Counter {
    counters: HashMap<&'static str, u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: HashMap::new(),
        }
    }

    pub fn increment(&mut self, name: &'static str, by: u64) {
        *self.counters.entry(name).or_insert(0) += by;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    /// All counters, sorted by name for stable output.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let mut out: Vec<_> = self.counters.iter().map(|(k, v)| (*k, *v)).collect();
        out.sort_unstable_by_key(|(name, _)| *name);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate() {
        let mut counter = Counter::new();
        counter.increment("entities_created", 2);
        counter.increment("entities_created", 3);
        assert_eq!(counter.get("entities_created"), 5);
        assert_eq!(counter.get("entities_destroyed"), 0);
    }

    #[test]
    fn snapshot_is_sorted() {
        let mut counter = Counter::new();
        counter.increment("groups_created", 1);
        counter.increment("entities_created", 4);
        assert_eq!(
            counter.snapshot(),
            vec![("entities_created", 4), ("groups_created", 1)]
        );
        counter.reset_all();
        assert!(counter.snapshot().is_empty());
    }
}
