//! Debris - displaced particles living as tiny physics circles
//!
//! Debris either settles back into the grid (slow, supported, over an air
//! cell) or is culled: invalid handle, out of the world, too old, or stuck
//! inside solids for too long.

use glam::Vec2;
use rand::rngs::SmallRng;
use rand::Rng;
use rapier2d::dynamics::RigidBodyHandle;

use super::PhysicsWorld;
use crate::config::SimConfig;
use crate::world::{Cell, Grid, Material};

struct DebrisParticle {
    handle: RigidBodyHandle,
    material: Material,
    settled_frames: u8,
    age_frames: u16,
    stuck_frames: u16,
}

/// Position and material of one live debris, for host-side rendering.
pub struct DebrisRenderData {
    pub position: Vec2,
    pub material: Material,
}

/// Tracks every live debris particle.
pub struct DebrisPool {
    debris: Vec<DebrisParticle>,
}

impl DebrisPool {
    pub fn new() -> Self {
        Self { debris: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.debris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.debris.is_empty()
    }

    /// Eject one displaced particle at the owning body's top with a soft
    /// random spread: vx in [-2, 2], vy in [-3, -1] (upward pop).
    pub fn spawn(
        &mut self,
        physics: &mut PhysicsWorld,
        config: &SimConfig,
        x_px: i32,
        top_y: f32,
        material: Material,
        rng: &mut SmallRng,
    ) {
        let vx = rng.gen_range(-2.0..=2.0);
        let vy = -1.0 - rng.gen_range(0.0..=2.0);
        let handle = physics.create_debris_body(
            x_px as f32 / config.pixels_per_meter,
            top_y,
            vx,
            vy,
            config.debris_radius_px / config.pixels_per_meter,
        );
        self.debris.push(DebrisParticle {
            handle,
            material,
            settled_frames: 0,
            age_frames: 0,
            stuck_frames: 0,
        });
    }

    /// Age, drag and settle every particle. Returns how many settled into
    /// the grid this frame.
    pub fn update(&mut self, grid: &mut Grid, physics: &mut PhysicsWorld, config: &SimConfig) -> usize {
        let ppm = config.pixels_per_meter;
        let (w, h) = (grid.width() as i32, grid.height() as i32);
        let (world_w, world_h) = (w as f32 / ppm, h as f32 / ppm);
        let mut settled = 0;

        self.debris.retain_mut(|particle| {
            if !physics.contains(particle.handle) {
                return false;
            }
            let Some(pos) = physics.translation(particle.handle) else {
                return false;
            };

            if !pos.x.is_finite()
                || !pos.y.is_finite()
                || pos.x < -10.0
                || pos.x > world_w + 10.0
                || pos.y < -10.0
                || pos.y > world_h + 10.0
            {
                physics.remove_body(particle.handle);
                return false;
            }

            particle.age_frames += 1;
            if particle.age_frames > config.debris_max_age_frames {
                physics.remove_body(particle.handle);
                return false;
            }

            let px = (pos.x * ppm).round() as i32;
            let py = (pos.y * ppm).round() as i32;
            let interior = px > 0 && px < w - 1 && py > 0 && py < h - 1;

            let mut speed = physics
                .linvel(particle.handle)
                .map(|v| v.length())
                .unwrap_or(0.0);
            let overlaps_solid = interior && !grid.cell(px, py).is_empty();
            if overlaps_solid {
                if let Some(v) = physics.linvel(particle.handle) {
                    physics.set_linvel(particle.handle, v * 0.8);
                    speed *= 0.8;
                }
                particle.stuck_frames += 1;
                if particle.stuck_frames > config.debris_max_stuck_frames {
                    physics.remove_body(particle.handle);
                    return false;
                }
            } else {
                particle.stuck_frames = 0;
                if speed < config.debris_settle_speed {
                    particle.settled_frames = particle.settled_frames.saturating_add(1);
                } else {
                    particle.settled_frames = 0;
                }
            }

            if particle.settled_frames >= config.debris_settle_frames {
                if interior {
                    let supported = !grid.cell(px, py + 1).is_empty();
                    if grid.cell(px, py).is_empty() && supported {
                        grid.write_cell(px, py, Cell::settled(particle.material));
                        physics.remove_body(particle.handle);
                        settled += 1;
                        return false;
                    }
                }
                particle.settled_frames = 0;
            }
            true
        });

        settled
    }

    /// Destroy every live debris body.
    pub fn clear(&mut self, physics: &mut PhysicsWorld) {
        for particle in self.debris.drain(..) {
            physics.remove_body(particle.handle);
        }
    }

    pub fn render_data(&self, physics: &PhysicsWorld) -> Vec<DebrisRenderData> {
        self.debris
            .iter()
            .filter_map(|particle| {
                physics.translation(particle.handle).map(|position| DebrisRenderData {
                    position,
                    material: particle.material,
                })
            })
            .collect()
    }
}

impl Default for DebrisPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshExtractor;
    use crate::worker_pool::WorkerPool;
    use rand::SeedableRng;

    fn setup() -> (Grid, PhysicsWorld, DebrisPool, SimConfig, SmallRng) {
        let config = SimConfig::default();
        (
            Grid::new(2, 2),
            PhysicsWorld::new(&config),
            DebrisPool::new(),
            config,
            SmallRng::seed_from_u64(7),
        )
    }

    #[test]
    fn test_spawn_tracks_particles() {
        let (_grid, mut physics, mut pool, config, mut rng) = setup();
        assert!(pool.is_empty());
        pool.spawn(&mut physics, &config, 64, 1.0, Material::Sand, &mut rng);
        pool.spawn(&mut physics, &config, 65, 1.0, Material::Water, &mut rng);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.render_data(&physics).len(), 2);
    }

    #[test]
    fn test_debris_settles_on_stone_floor() {
        let (mut grid, mut physics, mut pool, mut config, mut rng) = setup();
        // a full-pixel radius keeps resting centres clearly inside the air
        // cell above the floor
        config.debris_radius_px = 1.0;
        // stone floor across the world at row 100
        for x in 1..127 {
            grid.set_cell(x, 100, Material::Stone);
        }
        let worker_pool = WorkerPool::with_threads(1);
        let mut mesh = MeshExtractor::new(2, 2);
        let chains = mesh.extract(&mut grid, &worker_pool, &config);
        physics.update_terrain(&chains);

        // a line of debris just above the floor, one per column
        for i in 0..10 {
            pool.spawn(
                &mut physics,
                &config,
                40 + i * 4,
                90.0 / 32.0,
                Material::Sand,
                &mut rng,
            );
        }

        let mut settled_total = 0;
        for _ in 0..600 {
            physics.step();
            settled_total += pool.update(&mut grid, &mut physics, &config);
        }
        assert_eq!(pool.len(), 0, "all debris settled or culled");
        assert!(settled_total >= 1, "at least some debris must settle");
        assert_eq!(grid.count_material(Material::Sand), settled_total);
    }

    #[test]
    fn test_debris_inside_solid_is_culled() {
        let (mut grid, mut physics, mut pool, config, mut rng) = setup();
        for y in 40..60 {
            for x in 40..60 {
                grid.set_cell(x, y, Material::Stone);
            }
        }
        // spawned in the middle of the stone block
        pool.spawn(&mut physics, &config, 50, 50.0 / 32.0, Material::Sand, &mut rng);

        for _ in 0..30 {
            physics.step();
            pool.update(&mut grid, &mut physics, &config);
        }
        assert_eq!(pool.len(), 0);
        // culled, not settled: the block is unchanged and no sand appeared
        assert_eq!(grid.count_material(Material::Sand), 0);
    }

    #[test]
    fn test_debris_ages_out() {
        let (mut grid, mut physics, mut pool, mut config, mut rng) = setup();
        config.debris_max_age_frames = 20;
        // floating in the air of a world with no terrain chains: it falls,
        // but a short max age culls it first
        pool.spawn(&mut physics, &config, 64, 1.0, Material::Water, &mut rng);
        for _ in 0..25 {
            pool.update(&mut grid, &mut physics, &config);
        }
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_out_of_world_debris_is_destroyed() {
        let (mut grid, mut physics, mut pool, config, mut rng) = setup();
        // no terrain at all: debris falls past the world bottom (+10 m)
        pool.spawn(&mut physics, &config, 64, 3.5, Material::Sand, &mut rng);
        for _ in 0..2000 {
            physics.step();
            pool.update(&mut grid, &mut physics, &config);
            if pool.is_empty() {
                break;
            }
        }
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_clear_destroys_bodies() {
        let (_grid, mut physics, mut pool, config, mut rng) = setup();
        pool.spawn(&mut physics, &config, 64, 1.0, Material::Sand, &mut rng);
        pool.spawn(&mut physics, &config, 70, 1.0, Material::Sand, &mut rng);
        pool.clear(&mut physics);
        assert!(pool.is_empty());
        assert_eq!(pool.render_data(&physics).len(), 0);
    }
}
