//! Tessera Metrics - instrumentation for the ECS store
//!
//! Counters for structural events (entities created/destroyed, groups
//! created) and per-system timings for the scheduler. Everything here
//! compiles to no-ops unless the `metrics` feature is enabled.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tessera_metrics::{Counter, SystemProfiler};
//!
//! let mut profiler = SystemProfiler::new();
//! profiler.time_system("movement", || run_movement());
//! for (name, timing) in profiler.report() {
//!     println!("{name}: {:?} over {} calls", timing.total, timing.calls);
//! }
//! ```

use std::time::Duration;

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod system_profiler;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use system_profiler::SystemProfiler;

/// Accumulated timing for one named system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemTiming {
    pub total: Duration,
    pub last: Duration,
    pub calls: u64,
}

impl SystemTiming {
    /// Mean duration per call, zero if the system never ran.
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.calls as u32
        }
    }
}

// ============================================================================
// Macros for conditional compilation
// ============================================================================

/// Execute code only when metrics are enabled
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

/// Time a block against a profiler (zero-cost when metrics disabled)
#[macro_export]
macro_rules! time_scope {
    ($profiler:expr, $name:expr, $body:block) => {{
        #[cfg(feature = "metrics")]
        let result = $profiler.time_system($name, || $body);
        #[cfg(not(feature = "metrics"))]
        let result = {
            let _ = &$profiler;
            $body
        };
        result
    }};
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &'static str, _by: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn reset_all(&mut self) {}
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> { Vec::new() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct SystemProfiler;

#[cfg(not(feature = "metrics"))]
impl SystemProfiler {
    pub fn new() -> Self { Self }
    pub fn time_system<F, R>(&mut self, _name: &str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn timing(&self, _name: &str) -> SystemTiming { SystemTiming::default() }
    pub fn forget(&mut self, _name: &str) {}
    pub fn reset(&mut self) {}
    pub fn report(&self) -> Vec<(String, SystemTiming)> { Vec::new() }
}
