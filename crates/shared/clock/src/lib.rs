//! Vigil Clock Infrastructure
//!
//! Time sources behind the [`Clock`] port:
//!
//! - [`SystemClock`]: wall-clock time for production
//! - [`ManualClock`]: frozen time that only moves when told to, for
//!   deterministic tests of expiry, backoff and daily windows
//!
//! ```ignore
//! use vigil_clock::ManualClock;
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_at(start);
//! clock.advance(Duration::seconds(10)); // next tick
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use vigil_ports::Clock;
