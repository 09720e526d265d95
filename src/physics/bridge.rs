//! Rigid-body ↔ grid bridge - stamping bodies into cells and back
//!
//! Registered bodies are rasterized into the grid after every physics step
//! (stamp) and erased again before the next one (extract), so the cellular
//! automaton never sees a body mid-flight. Terrain cells a stamp overwrites
//! are reported back as displaced and turn into debris.

use glam::Vec2;
use rapier2d::dynamics::RigidBodyHandle;
use std::collections::BTreeMap;

use super::PhysicsWorld;
use crate::world::{Cell, Grid, Material};

/// Registry entry for one rigid body.
pub struct BodyRecord {
    pub handle: RigidBodyHandle,
    /// Half extents of the body's box in metres.
    pub half_extents: Vec2,
    /// Material stamped into every covered cell.
    pub material: Material,
}

/// Maps 1-based body ids (the `body` byte in grid cells) to their physics
/// bodies. Id 0 is reserved for terrain; ids are never recycled within a
/// world lifetime, so at most 255 bodies can ever be registered.
pub struct RigidBridge {
    bodies: BTreeMap<u8, BodyRecord>,
    next_id: u8,
}

impl RigidBridge {
    pub fn new() -> Self {
        Self {
            bodies: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Allocate an id for a new body. Returns `None` once the id space is
    /// exhausted; the host is expected to reset the world.
    pub fn register(
        &mut self,
        handle: RigidBodyHandle,
        half_width: f32,
        half_height: f32,
        material: Material,
    ) -> Option<u8> {
        if self.next_id == 0 {
            log::error!("body id space exhausted (255 bodies registered)");
            return None;
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.bodies.insert(
            id,
            BodyRecord {
                handle,
                half_extents: Vec2::new(half_width, half_height),
                material,
            },
        );
        log::debug!("Registered body {} ({:?})", id, material);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Registered ids in ascending order, so per-step iteration is
    /// reproducible.
    pub fn body_ids(&self) -> Vec<u8> {
        self.bodies.keys().copied().collect()
    }

    pub fn record(&self, id: u8) -> Option<&BodyRecord> {
        self.bodies.get(&id)
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.next_id = 1;
    }

    /// Erase every registered body's stamped footprint from the grid.
    pub fn extract_all(&self, grid: &mut Grid, physics: &PhysicsWorld, pixels_per_meter: f32) {
        for (&id, record) in &self.bodies {
            if !physics.contains(record.handle) {
                log::error!("body {} has an invalid physics handle", id);
                continue;
            }
            for_each_pixel_in_body(physics, record.handle, pixels_per_meter, |px, py| {
                if grid.cell(px, py).body == id {
                    grid.write_cell(px, py, Cell::AIR);
                }
            });
        }
    }

    /// Stamp one body back into the grid, returning the terrain cells it
    /// displaced.
    pub fn restore_body(
        &self,
        id: u8,
        grid: &mut Grid,
        physics: &PhysicsWorld,
        pixels_per_meter: f32,
    ) -> Vec<(i32, i32, Material)> {
        let mut displaced = Vec::new();
        let Some(record) = self.bodies.get(&id) else {
            log::error!("restore requested for unknown body {}", id);
            return displaced;
        };
        if !physics.contains(record.handle) {
            log::error!("body {} has an invalid physics handle", id);
            return displaced;
        }

        let (w, h) = (grid.width() as i32, grid.height() as i32);
        for_each_pixel_in_body(physics, record.handle, pixels_per_meter, |px, py| {
            if px > 0 && px < w - 1 && py > 0 && py < h - 1 {
                let cell = grid.cell(px, py);
                if cell.body == 0 && !cell.material.is_air() {
                    displaced.push((px, py, cell.material));
                }
                grid.write_cell(px, py, Cell::stamped(record.material, id));
            }
        });
        displaced
    }

    /// Stamp every body, concatenating the displaced cells.
    pub fn restore_all(
        &self,
        grid: &mut Grid,
        physics: &PhysicsWorld,
        pixels_per_meter: f32,
    ) -> Vec<(i32, i32, Material)> {
        let mut all = Vec::new();
        for id in self.body_ids() {
            all.extend(self.restore_body(id, grid, physics, pixels_per_meter));
        }
        all
    }

    /// The debris spawn height for a body: the lowest y over its
    /// transformed corners, lifted by two pixel-heights, so displaced
    /// material fountains out of the top instead of appearing inside.
    pub fn spawn_top(&self, id: u8, physics: &PhysicsWorld, pixels_per_meter: f32) -> Option<f32> {
        let record = self.bodies.get(&id)?;
        let (hx, hy) = (record.half_extents.x, record.half_extents.y);
        let corners = [
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ];
        let mut min_y = f32::INFINITY;
        for corner in corners {
            let world = physics.transform_point(record.handle, corner)?;
            min_y = min_y.min(world.y);
        }
        Some(min_y - 2.0 / pixels_per_meter)
    }
}

impl Default for RigidBridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk the pixel AABB of a body and call `f` for every pixel whose centre
/// lies inside one of its shapes.
fn for_each_pixel_in_body(
    physics: &PhysicsWorld,
    handle: RigidBodyHandle,
    pixels_per_meter: f32,
    mut f: impl FnMut(i32, i32),
) {
    let Some((min, max)) = physics.body_aabb(handle) else {
        log::error!("body {:?} has no colliders", handle);
        return;
    };
    let min_x = (min.x * pixels_per_meter).floor() as i32;
    let max_x = (max.x * pixels_per_meter).ceil() as i32;
    let min_y = (min.y * pixels_per_meter).floor() as i32;
    let max_y = (max.y * pixels_per_meter).ceil() as i32;

    for py in min_y..=max_y {
        for px in min_x..=max_x {
            let centre = Vec2::new(
                (px as f32 + 0.5) / pixels_per_meter,
                (py as f32 + 0.5) / pixels_per_meter,
            );
            if physics.point_in_body(handle, centre) {
                f(px, py);
            }
        }
    }
}
