//! Per-system wall-clock timing

use crate::SystemTiming;
use std::collections::HashMap;
use std::time::Instant;

pub struct SystemProfiler {
    timings: HashMap<String, SystemTiming>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
        }
    }

    pub fn time_system<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        let entry = match self.timings.get_mut(name) {
            Some(entry) => entry,
            None => self.timings.entry(name.to_string()).or_default(),
        };
        entry.total += elapsed;
        entry.last = elapsed;
        entry.calls += 1;
        result
    }

    pub fn timing(&self, name: &str) -> SystemTiming {
        self.timings.get(name).copied().unwrap_or_default()
    }

    /// Drop the record of a system that has been unregistered.
    pub fn forget(&mut self, name: &str) {
        self.timings.remove(name);
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    /// Timings sorted by total time, most expensive first.
    pub fn report(&self) -> Vec<(String, SystemTiming)> {
        let mut out: Vec<_> = self
            .timings
            .iter()
            .map(|(name, timing)| (name.clone(), *timing))
            .collect();
        out.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

impl Default for SystemProfiler {
    fn default() -> Self {
        Self::new()
    }
}
