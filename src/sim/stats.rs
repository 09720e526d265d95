//! Simulation statistics - lock-free atomics with plain snapshots

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Counters published by the simulation thread.
///
/// Everything is relaxed: the numbers are monitoring output, not
/// synchronization. Hosts read a coherent-enough [`StatsSnapshot`] at any
/// time without touching the simulation lock.
#[derive(Default)]
pub struct SimStats {
    sps_bits: AtomicU32,
    step_count: AtomicU64,
    dynamic_bodies: AtomicUsize,
    terrain_shapes: AtomicUsize,
    debris: AtomicUsize,
    chain_count: AtomicUsize,
    mesh_ms: AtomicU32,
    physics_ms: AtomicU32,
}

/// One coherent read of the counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    /// Simulation steps per second, measured over the last second.
    pub sps: f32,
    pub step_count: u64,
    pub dynamic_bodies: usize,
    pub terrain_shapes: usize,
    pub debris: usize,
    pub chain_count: usize,
    pub mesh_ms: u32,
    pub physics_ms: u32,
}

impl SimStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sps(&self, sps: f32) {
        self.sps_bits.store(sps.to_bits(), Ordering::Relaxed);
    }

    pub fn bump_step(&self) -> u64 {
        self.step_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn step_count(&self) -> u64 {
        self.step_count.load(Ordering::Relaxed)
    }

    pub fn publish_step(
        &self,
        dynamic_bodies: usize,
        terrain_shapes: usize,
        debris: usize,
        chain_count: usize,
        mesh_ms: u32,
        physics_ms: u32,
    ) {
        self.dynamic_bodies.store(dynamic_bodies, Ordering::Relaxed);
        self.terrain_shapes.store(terrain_shapes, Ordering::Relaxed);
        self.debris.store(debris, Ordering::Relaxed);
        self.chain_count.store(chain_count, Ordering::Relaxed);
        self.mesh_ms.store(mesh_ms, Ordering::Relaxed);
        self.physics_ms.store(physics_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sps: f32::from_bits(self.sps_bits.load(Ordering::Relaxed)),
            step_count: self.step_count.load(Ordering::Relaxed),
            dynamic_bodies: self.dynamic_bodies.load(Ordering::Relaxed),
            terrain_shapes: self.terrain_shapes.load(Ordering::Relaxed),
            debris: self.debris.load(Ordering::Relaxed),
            chain_count: self.chain_count.load(Ordering::Relaxed),
            mesh_ms: self.mesh_ms.load(Ordering::Relaxed),
            physics_ms: self.physics_ms.load(Ordering::Relaxed),
        }
    }
}
