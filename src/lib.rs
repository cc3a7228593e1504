//! Runtime capability detection and tick-thread affinity enforcement
//!
//! Two leaf components for a tick-driven server:
//!
//! - [`CapabilityDetector`] probes the environment once for SIMD support and
//!   publishes an immutable [`CapabilitySnapshot`] that hot paths consult.
//! - [`AffinityGuard`] asserts that main-thread-only operations run on the
//!   registered authoritative (tick) thread and panics loudly when they don't.
//!
//! [`RuntimeContext`] bundles both for the host's startup sequence.

pub mod engines;

pub use engines::core::affinity::{AffinityGuard, AffinityViolation};
pub use engines::core::probe::{
    HostEnvironment, PlatformInfo, ProbeConfig, ProbeEnvironment, ProbeError,
};
pub use engines::core::simd::{
    CapabilityDetector, CapabilitySnapshot, CopyPath, LaneInfo, LARGE_COPY_THRESHOLD,
};
pub use engines::core::RuntimeContext;
pub use engines::{EngineError, EngineResult};
