pub mod affinity;
pub mod bulk;
pub mod probe;
pub mod simd;

use std::sync::Arc;

use self::affinity::AffinityGuard;
use self::probe::{HostEnvironment, ProbeConfig, ProbeEnvironment};
use self::simd::CapabilityDetector;

/// Long-lived runtime state owned by the host's startup sequence
///
/// Holds the capability detector and the affinity guard. Share it as
/// `Arc<RuntimeContext>` with every component that needs either.
#[derive(Debug)]
pub struct RuntimeContext {
    capabilities: CapabilityDetector,
    affinity: Arc<AffinityGuard>,
}

impl RuntimeContext {
    /// Build a context and run the capability probe eagerly
    pub fn new(environment: impl ProbeEnvironment + 'static) -> Self {
        let context = Self {
            capabilities: CapabilityDetector::new(environment),
            affinity: Arc::new(AffinityGuard::new()),
        };
        context.capabilities.ensure_initialized();
        context
    }

    pub fn from_config(config: ProbeConfig) -> Self {
        Self::new(HostEnvironment::new(config))
    }

    /// Context for the host, configured from `TICK_RUNTIME_*` variables
    pub fn host() -> Self {
        Self::from_config(ProbeConfig::from_env())
    }

    pub fn capabilities(&self) -> &CapabilityDetector {
        &self.capabilities
    }

    pub fn affinity(&self) -> &Arc<AffinityGuard> {
        &self.affinity
    }
}
