//! SIMD capability detection
//!
//! This module owns the one-time capability probe and the immutable
//! snapshot it publishes. Hot paths read the snapshot to choose between a
//! small and a large implementation strategy without probing again.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::bulk;
use super::probe::{run_probe, HostEnvironment, ProbeConfig, ProbeEnvironment};
use crate::engines::{check_range, EngineResult};

/// Copies longer than this many elements take the large path when SIMD is enabled
pub const LARGE_COPY_THRESHOLD: usize = 64;

/// Vector register width and element size of a tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneInfo {
    pub bit_width: u32,
    pub element_bits: u32,
}

impl LaneInfo {
    /// No vector tier
    pub const NONE: LaneInfo = LaneInfo::new(0, 0);
    /// Tier selected when a wide vector facility is present
    pub const HIGH: LaneInfo = LaneInfo::new(256, 32);
    /// Tier selected from architecture identification alone
    pub const BASELINE: LaneInfo = LaneInfo::new(128, 32);

    pub const fn new(bit_width: u32, element_bits: u32) -> Self {
        Self {
            bit_width,
            element_bits,
        }
    }

    pub fn is_none(&self) -> bool {
        self.bit_width == 0
    }

    /// Number of elements packed into one vector
    pub fn lanes(&self) -> u32 {
        if self.element_bits == 0 {
            0
        } else {
            self.bit_width / self.element_bits
        }
    }

    /// Whether this lane configuration is one the dispatch layer can use
    pub fn is_supported(&self) -> bool {
        matches!(self.bit_width, 128 | 256 | 512)
            && matches!(self.element_bits, 8 | 16 | 32 | 64)
            && self.element_bits <= self.bit_width
    }
}

impl fmt::Display for LaneInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.bit_width, self.element_bits)
    }
}

/// Immutable result of the capability probe
///
/// `Default` is the pre-probe state: everything false and zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub initialized: bool,
    pub enabled: bool,
    pub probe_completed: bool,
    pub unsupported_lane_width: bool,
    pub int_lanes: LaneInfo,
    pub float_lanes: LaneInfo,
}

impl CapabilitySnapshot {
    /// A finished probe that found no usable tier
    pub const fn disabled() -> Self {
        Self {
            initialized: true,
            enabled: false,
            probe_completed: true,
            unsupported_lane_width: false,
            int_lanes: LaneInfo::NONE,
            float_lanes: LaneInfo::NONE,
        }
    }

    /// Enable `tier` for both integer and float lanes
    ///
    /// A tier with zero width leaves the snapshot disabled.
    pub fn with_tier(mut self, tier: LaneInfo) -> Self {
        if tier.is_none() {
            return self;
        }
        self.enabled = true;
        self.int_lanes = tier;
        self.float_lanes = tier;
        self
    }

    /// Human-readable status line
    pub fn describe(&self) -> String {
        if !self.initialized {
            "SIMD detection not yet run".to_string()
        } else if self.enabled {
            format!(
                "SIMD enabled (int {}, float {})",
                self.int_lanes, self.float_lanes
            )
        } else if self.unsupported_lane_width {
            "SIMD disabled (unsupported lane width)".to_string()
        } else {
            "SIMD disabled".to_string()
        }
    }
}

/// Strategy chosen for a bulk copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPath {
    Small,
    Large,
}

/// Lazily probes the environment once and serves the resulting snapshot
pub struct CapabilityDetector {
    environment: Box<dyn ProbeEnvironment>,
    snapshot: OnceLock<CapabilitySnapshot>,
    probes: AtomicUsize,
}

impl CapabilityDetector {
    /// Create a detector that will probe `environment` on first use
    pub fn new(environment: impl ProbeEnvironment + 'static) -> Self {
        Self {
            environment: Box::new(environment),
            snapshot: OnceLock::new(),
            probes: AtomicUsize::new(0),
        }
    }

    /// Create a detector for the host, configured from `TICK_RUNTIME_*` variables
    pub fn host() -> Self {
        Self::new(HostEnvironment::new(ProbeConfig::from_env()))
    }

    /// Run the probe if it has not run yet and return the snapshot
    ///
    /// Concurrent first callers block until the single probe finishes; a
    /// failed probe is terminal and is not retried.
    pub fn ensure_initialized(&self) -> &CapabilitySnapshot {
        self.snapshot.get_or_init(|| {
            self.probes.fetch_add(1, Ordering::Relaxed);
            let snapshot = run_probe(self.environment.as_ref());
            log_status(&snapshot);
            snapshot
        })
    }

    /// Current snapshot, or the all-false default if the probe has not run
    #[inline]
    pub fn snapshot(&self) -> CapabilitySnapshot {
        self.snapshot.get().copied().unwrap_or_default()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.snapshot().enabled
    }

    #[inline]
    pub fn int_lane_info(&self) -> LaneInfo {
        self.snapshot().int_lanes
    }

    #[inline]
    pub fn float_lane_info(&self) -> LaneInfo {
        self.snapshot().float_lanes
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.snapshot().initialized
    }

    #[inline]
    pub fn probe_completed(&self) -> bool {
        self.snapshot().probe_completed
    }

    #[inline]
    pub fn has_unsupported_lane_width(&self) -> bool {
        self.snapshot().unsupported_lane_width
    }

    /// Number of probes that have run (0 or 1)
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }

    /// Pick the copy strategy for `length` elements
    pub fn select_path(&self, length: usize) -> CopyPath {
        if self.ensure_initialized().enabled && length > LARGE_COPY_THRESHOLD {
            CopyPath::Large
        } else {
            CopyPath::Small
        }
    }

    /// Copy `src[..length]` into `dst[dst_offset..dst_offset + length]`
    ///
    /// `large` runs when SIMD is enabled and `length` exceeds
    /// [`LARGE_COPY_THRESHOLD`]; `small` runs otherwise. Both receive
    /// equal-length slices. The ranges are checked before either runs.
    pub fn copy_with_strategy<T, S, L>(
        &self,
        src: &[T],
        dst: &mut [T],
        dst_offset: usize,
        length: usize,
        small: S,
        large: L,
    ) -> EngineResult<CopyPath>
    where
        S: FnOnce(&[T], &mut [T]),
        L: FnOnce(&[T], &mut [T]),
    {
        check_range("source", 0, length, src.len())?;
        check_range("destination", dst_offset, length, dst.len())?;

        let src = &src[..length];
        let dst = &mut dst[dst_offset..dst_offset + length];

        let path = self.select_path(length);
        match path {
            CopyPath::Small => small(src, dst),
            CopyPath::Large => large(src, dst),
        }

        Ok(path)
    }

    /// Integer bulk copy using the default strategies
    pub fn copy_ints(
        &self,
        src: &[i32],
        dst: &mut [i32],
        dst_offset: usize,
        length: usize,
    ) -> EngineResult<CopyPath> {
        self.copy_with_strategy(
            src,
            dst,
            dst_offset,
            length,
            bulk::scalar_copy,
            bulk::bulk_copy,
        )
    }

    /// Float bulk copy using the default strategies
    pub fn copy_floats(
        &self,
        src: &[f32],
        dst: &mut [f32],
        dst_offset: usize,
        length: usize,
    ) -> EngineResult<CopyPath> {
        self.copy_with_strategy(
            src,
            dst,
            dst_offset,
            length,
            bulk::scalar_copy,
            bulk::bulk_copy,
        )
    }
}

impl Default for CapabilityDetector {
    fn default() -> Self {
        Self::host()
    }
}

impl fmt::Debug for CapabilityDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDetector")
            .field("snapshot", &self.snapshot.get())
            .field("probes", &self.probe_count())
            .finish()
    }
}

fn log_status(snapshot: &CapabilitySnapshot) {
    if snapshot.enabled {
        log::info!(
            "SIMD support detected and enabled - Vector sizes: int {}, float {}",
            snapshot.int_lanes,
            snapshot.float_lanes
        );
    } else {
        log::info!("SIMD support not available - running without SIMD optimizations");
    }
}
