//! Simulated device transport for conductor testing.
//!
//! Provides an in-memory [`conductor_core::DeviceLink`] implementation
//! with hardware-like behaviors:
//!
//! - **mode**: operational modes (Instant, Realistic)
//! - **fault**: seeded fault injection framework
//! - **link**: the simulated link, its builder and the provider
//!
//! Writes land in a field map after a configurable settle delay, so check
//! loops genuinely poll; connect behavior, fault scenarios and call
//! counters make timeout, failure and call-count-spy tests deterministic.

pub mod fault;
pub mod link;
pub mod mode;
pub mod rng;

// Re-export commonly used types
pub use fault::{Access, FaultConfig, FaultScenario};
pub use link::{ConnectBehavior, SimLink, SimLinkBuilder, SimLinkProvider};
pub use mode::SimMode;
pub use rng::SimRng;
