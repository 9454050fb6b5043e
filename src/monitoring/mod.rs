//! Resource and traffic monitoring.
//!
//! # Data Flow
//! ```text
//! interval tick
//!     → sampler.rs (memory/cpu/disk per instance)
//!     → collector.rs (windowed traffic, latency fallback)
//!     → history.rs (bounded series per instance and metric)
//!     → snapshot.rs (fleet aggregate)
//!     → alerts::AlertEngine::evaluate
//! ```

pub mod collector;
pub mod history;
pub mod sampler;
pub mod snapshot;

pub use collector::{CollectionReport, InstanceSample, MetricsCollector, SampleFailure};
pub use history::{MetricHistory, MetricKind, MetricPoint};
pub use sampler::{FixedSampler, ResourceSample, ResourceSampler, SampleError, SystemSampler};
pub use snapshot::{CategorySnapshot, FleetSnapshot};
