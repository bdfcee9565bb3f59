//! flowstat collector - Execution status tracking for orchestration engines
//!
//! Turns node lifecycle callbacks into status events and fans them out:
//! - History kept on the collector itself
//! - Synchronous in-process callback and store write
//! - Background webhook delivery that never blocks the engine
//!
//! A collector travels with the call tree on a [`flowstat_core::Context`]
//! (see [`binding`]) so nested node code can report status without being
//! handed it explicitly.

pub mod binding;
pub mod collector;
pub mod factory;
pub mod metrics;
pub mod telemetry;
pub mod usage;

pub use binding::{status_collector, with_status_collector, ContextExt};
pub use collector::{NodeError, StatusCallback, StatusCollector};
pub use factory::CollectorFactory;
pub use metrics::CollectorMetrics;
pub use telemetry::CollectorTelemetry;
pub use usage::UsageAccumulator;
