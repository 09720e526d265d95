//! grainfall - a chunked falling-sand simulation coupled bidirectionally to a
//! rigid-body physics world.
//!
//! The crate is organized around four pieces:
//! - [`world`]: the cellular grid, per-material movement rules and the
//!   four-phase parallel chunk scheduler
//! - [`mesh`]: boundary extraction from solid pixels into collider chains
//! - [`physics`]: the rapier2d wrapper, the rigid-body ↔ grid bridge and the
//!   debris pool
//! - [`sim`]: the simulation thread, step gating and statistics
//!
//! The host embeds the crate through [`sim::Simulation`], which owns the
//! simulation thread, or [`sim::SimCore`] for synchronous stepping.

pub mod config;
pub mod mesh;
pub mod physics;
pub mod sim;
pub mod worker_pool;
pub mod world;

pub use config::SimConfig;
pub use mesh::MeshExtractor;
pub use physics::{DebrisPool, PhysicsWorld, RigidBridge};
pub use sim::{SimCore, Simulation, StatsSnapshot};
pub use worker_pool::WorkerPool;
pub use world::{Cell, Grid, Material, CHUNK_SIZE};
