//! Capability probing
//!
//! The probe inspects the execution environment once and classifies the
//! vector tier it can offer. The environment is reached through the
//! [`ProbeEnvironment`] trait so the host decides, at build or startup time,
//! where facility and platform information come from.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use super::simd::{CapabilitySnapshot, LaneInfo};

/// Environment variable overriding the architecture string
pub const ARCH_ENV: &str = "TICK_RUNTIME_ARCH";
/// Environment variable overriding the OS identification string
pub const OS_ENV: &str = "TICK_RUNTIME_OS";
/// Environment variable forcing the vector facility on or off
pub const VECTOR_FACILITY_ENV: &str = "TICK_RUNTIME_VECTOR_FACILITY";

/// Error types raised while probing
///
/// These never leave the detector: every probe fault is logged and
/// resolved to [`CapabilitySnapshot::disabled`].
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Atomic self-check failed: expected {expected}, observed {observed}")]
    SelfCheckFailed { expected: u32, observed: u32 },

    #[error("Vector facility lookup failed: {0}")]
    FacilityLookup(String),

    #[error("Platform identification failed: {0}")]
    Platform(String),

    #[error("Probe panicked: {0}")]
    Panicked(String),
}

/// Platform identification strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Processor architecture name, e.g. `x86_64`
    pub arch: String,
    /// Operating system / vendor identification
    pub os: String,
}

/// Source of everything the probe needs to know about the host
pub trait ProbeEnvironment: Send + Sync {
    /// Confirm the environment can do basic concurrent-safe arithmetic
    fn self_check(&self) -> Result<(), ProbeError> {
        let counter = AtomicU32::new(0);
        counter.fetch_add(1, Ordering::SeqCst);
        let observed = counter.load(Ordering::SeqCst);

        if observed != 1 {
            return Err(ProbeError::SelfCheckFailed {
                expected: 1,
                observed,
            });
        }

        Ok(())
    }

    /// Report the tier offered by a high-level vector facility, if one is present
    fn vector_facility(&self) -> Result<Option<LaneInfo>, ProbeError>;

    /// Identify the platform for architecture fallback
    fn platform(&self) -> Result<PlatformInfo, ProbeError>;
}

/// Runtime configuration for [`HostEnvironment`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Replaces `std::env::consts::ARCH`
    pub arch_override: Option<String>,
    /// Replaces `std::env::consts::OS`
    pub os_override: Option<String>,
    /// Forces presence or absence of the vector facility
    pub vector_facility: Option<bool>,
}

impl ProbeConfig {
    /// Build a configuration from `TICK_RUNTIME_*` environment variables
    pub fn from_env() -> Self {
        Self {
            arch_override: non_empty_var(ARCH_ENV),
            os_override: non_empty_var(OS_ENV),
            vector_facility: non_empty_var(VECTOR_FACILITY_ENV)
                .and_then(|value| parse_flag(VECTOR_FACILITY_ENV, &value)),
        }
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch_override = Some(arch.into());
        self
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os_override = Some(os.into());
        self
    }

    pub fn with_vector_facility(mut self, present: bool) -> Self {
        self.vector_facility = Some(present);
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            log::warn!("Ignoring {}={:?}: expected a boolean", key, value);
            None
        }
    }
}

/// Production probe environment
///
/// The vector facility is a build-time property: it is present when the
/// crate is built with the `wide-lanes` feature or with AVX2 enabled as a
/// target feature. Platform strings come from `std::env::consts`.
#[derive(Debug, Clone, Default)]
pub struct HostEnvironment {
    config: ProbeConfig,
}

impl HostEnvironment {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Whether the build declares a wide vector facility
    pub const fn compiled_facility() -> bool {
        cfg!(any(feature = "wide-lanes", target_feature = "avx2"))
    }
}

impl ProbeEnvironment for HostEnvironment {
    fn vector_facility(&self) -> Result<Option<LaneInfo>, ProbeError> {
        let present = self
            .config
            .vector_facility
            .unwrap_or_else(Self::compiled_facility);

        Ok(present.then_some(LaneInfo::HIGH))
    }

    fn platform(&self) -> Result<PlatformInfo, ProbeError> {
        let arch = self
            .config
            .arch_override
            .clone()
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());
        let os = self
            .config
            .os_override
            .clone()
            .unwrap_or_else(|| std::env::consts::OS.to_string());

        Ok(PlatformInfo { arch, os })
    }
}

/// Classify an architecture string into the baseline tier
///
/// Matching is case-insensitive and by substring, so `x86_64-unknown-linux`
/// and `AMD64` both classify.
pub fn classify_arch(arch: &str) -> Option<LaneInfo> {
    let arch = arch.to_ascii_lowercase();

    if arch.contains("amd64") || arch.contains("x86_64") {
        return Some(LaneInfo::BASELINE);
    }

    if arch.contains("aarch64") || arch.contains("arm64") {
        return Some(LaneInfo::BASELINE);
    }

    None
}

/// Run the full probe sequence against `environment`
///
/// Never fails: errors and panics are logged at warn level and resolved to
/// the disabled snapshot.
pub fn run_probe(environment: &dyn ProbeEnvironment) -> CapabilitySnapshot {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| probe_tiers(environment)))
        .unwrap_or_else(|payload| Err(ProbeError::Panicked(panic_message(payload.as_ref()))));

    match outcome {
        Ok(snapshot) => snapshot,
        Err(err) => {
            log::warn!("Failed to initialize SIMD detection: {}", err);
            CapabilitySnapshot::disabled()
        }
    }
}

fn probe_tiers(environment: &dyn ProbeEnvironment) -> Result<CapabilitySnapshot, ProbeError> {
    environment.self_check()?;

    let mut snapshot = CapabilitySnapshot::disabled();

    if let Some(tier) = environment.vector_facility()? {
        if tier.is_supported() {
            log::debug!("Vector facility present with lanes {}", tier);
            return Ok(snapshot.with_tier(tier));
        }

        log::debug!("Rejected vector facility lane width {}", tier);
        snapshot.unsupported_lane_width = true;
    }

    let platform = environment.platform()?;
    match classify_arch(&platform.arch) {
        Some(tier) => {
            log::debug!(
                "Architecture fallback: {} ({}) uses lanes {}",
                platform.arch,
                platform.os,
                tier
            );
            Ok(snapshot.with_tier(tier))
        }
        None => {
            log::debug!("No vector tier for architecture {} ({})", platform.arch, platform.os);
            Ok(snapshot)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
