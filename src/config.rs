//! Simulation configuration - serializable tunables for the whole engine
//!
//! All runtime tunables live in one `SimConfig` value passed in at
//! construction. Presets serialize to RON so a host can ship alternative
//! parameter sets without recompiling.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::world::CHUNK_SIZE;

/// Runtime tunables for the simulation core.
///
/// The config is read-mostly: it is handed to [`crate::sim::SimCore`] once
/// and never mutated afterwards. The seed drives every PRNG in the engine,
/// so two runs with the same config and the same inputs replay identically
/// on a single-threaded worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed conversion factor between grid pixels and physics metres.
    pub pixels_per_meter: f32,

    /// Maximum lateral reach of a water cell in one step.
    /// Clamped below half a chunk so the four-phase update stays safe.
    pub water_max_dist: u32,

    /// Falloff denominator for the lateral spread gate; larger values make
    /// water spread less far on average (1 = full spread).
    pub water_spread_falloff: u32,

    /// Collinearity threshold for mesh chain simplification.
    pub simplify_epsilon: f32,

    /// Debris older than this many physics frames is culled.
    pub debris_max_age_frames: u16,

    /// Below this speed (m/s) a debris particle counts as settling.
    pub debris_settle_speed: f32,

    /// Consecutive slow frames required before a debris settles into the grid.
    pub debris_settle_frames: u8,

    /// Frames a debris may overlap solid cells before it is culled.
    pub debris_max_stuck_frames: u16,

    /// Debris collider radius in pixels.
    pub debris_radius_px: f32,

    /// Fixed physics timestep in seconds.
    pub physics_dt: f32,

    /// Gravity in m/s², positive y points down.
    pub gravity: f32,

    /// Base RNG seed for cell rules and debris velocities.
    pub seed: u64,

    /// Worker pool size; 0 uses the machine's available parallelism.
    pub worker_threads: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pixels_per_meter: 32.0,
            water_max_dist: 10,
            water_spread_falloff: 1,
            simplify_epsilon: 1e-4,
            debris_max_age_frames: 420,
            debris_settle_speed: 0.5,
            debris_settle_frames: 5,
            debris_max_stuck_frames: 10,
            debris_radius_px: 0.5,
            physics_dt: 1.0 / 60.0,
            gravity: 10.0,
            seed: 0x5eed_0f_5a_4d,
            worker_threads: 0,
        }
    }
}

impl SimConfig {
    /// Load a config preset from a RON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = ron::from_str(&text)?;
        log::info!("Loaded config preset from {:?}", path);
        Ok(config.sanitized())
    }

    /// Clamp values that would violate engine invariants.
    ///
    /// `water_max_dist` must stay below half a chunk: the four-phase chunk
    /// colouring only isolates concurrent writes when no cell reaches past
    /// the middle of a neighbouring chunk.
    pub fn sanitized(mut self) -> Self {
        let max_reach = (CHUNK_SIZE / 2 - 1) as u32;
        if self.water_max_dist == 0 || self.water_max_dist > max_reach {
            log::warn!(
                "water_max_dist {} outside 1..={}, clamping",
                self.water_max_dist,
                max_reach
            );
            self.water_max_dist = self.water_max_dist.clamp(1, max_reach);
        }
        if self.water_spread_falloff == 0 {
            log::warn!("water_spread_falloff 0 is invalid, using 1");
            self.water_spread_falloff = 1;
        }
        if self.pixels_per_meter <= 0.0 {
            log::warn!("pixels_per_meter must be positive, using 32.0");
            self.pixels_per_meter = 32.0;
        }
        if self.physics_dt <= 0.0 {
            log::warn!("physics_dt must be positive, using 1/60");
            self.physics_dt = 1.0 / 60.0;
        }
        self
    }
}
