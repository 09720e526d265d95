//! Physics world - rapier2d wrapper for terrain, boxes and debris

mod bridge;
mod debris;

use glam::Vec2;
use rapier2d::prelude::*;

use crate::config::SimConfig;
use crate::mesh::Chain;

pub use bridge::{BodyRecord, RigidBridge};
pub use debris::{DebrisPool, DebrisRenderData};

/// Collision filter groups shared by every collider in the world.
pub mod filter {
    use rapier2d::prelude::Group;

    pub const TERRAIN: Group = Group::GROUP_1;
    pub const DYNAMIC: Group = Group::GROUP_2;
    pub const DEBRIS: Group = Group::GROUP_3;
}

/// Owns the rapier sets and pipeline plus the single static terrain body
/// that receives a fresh set of chain colliders every step.
pub struct PhysicsWorld {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    gravity: Vector<Real>,
    terrain_body: RigidBodyHandle,
    dynamic_bodies: Vec<RigidBodyHandle>,
}

impl PhysicsWorld {
    pub fn new(config: &SimConfig) -> Self {
        let integration_parameters = IntegrationParameters {
            dt: config.physics_dt,
            ..Default::default()
        };

        let mut rigid_body_set = RigidBodySet::new();
        let terrain_body = rigid_body_set.insert(RigidBodyBuilder::fixed().build());

        Self {
            rigid_body_set,
            collider_set: ColliderSet::new(),
            pipeline: PhysicsPipeline::new(),
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            // y points down in grid space, so gravity is positive
            gravity: vector![0.0, config.gravity],
            terrain_body,
            dynamic_bodies: Vec::new(),
        }
    }

    /// Destroy every body and start over with a fresh terrain body.
    pub fn reset(&mut self, config: &SimConfig) {
        *self = Self::new(config);
        log::info!("Physics world reset");
    }

    /// Advance the simulation by the configured fixed timestep.
    pub fn step(&mut self) {
        let physics_hooks = ();
        let event_handler = ();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &physics_hooks,
            &event_handler,
        );
    }

    /// Replace the terrain colliders with a fresh set of chains.
    ///
    /// 2-vertex chains become single segments, a 3-vertex open chain
    /// becomes two segments, closed chains become polyline loops and longer
    /// open chains open polylines.
    pub fn update_terrain(&mut self, chains: &[Chain]) {
        let old: Vec<ColliderHandle> = self.rigid_body_set[self.terrain_body].colliders().to_vec();
        for handle in old {
            self.collider_set.remove(
                handle,
                &mut self.island_manager,
                &mut self.rigid_body_set,
                false,
            );
        }

        let groups = InteractionGroups::new(filter::TERRAIN, filter::DYNAMIC | filter::DEBRIS);
        for chain in chains {
            let n = chain.len();
            if n < 2 {
                continue;
            }
            let closed = n >= 3 && chain[0].distance_squared(chain[n - 1]) < 1e-6;

            if n == 2 || (n == 3 && !closed) {
                for pair in chain.windows(2) {
                    let collider = ColliderBuilder::segment(
                        point![pair[0].x, pair[0].y],
                        point![pair[1].x, pair[1].y],
                    )
                    .collision_groups(groups)
                    .build();
                    self.collider_set.insert_with_parent(
                        collider,
                        self.terrain_body,
                        &mut self.rigid_body_set,
                    );
                }
                continue;
            }

            let collider = if closed {
                let vertices: Vec<Point<Real>> = chain[..n - 1]
                    .iter()
                    .map(|v| point![v.x, v.y])
                    .collect();
                let count = vertices.len() as u32;
                let indices: Vec<[u32; 2]> =
                    (0..count).map(|i| [i, (i + 1) % count]).collect();
                ColliderBuilder::polyline(vertices, Some(indices))
            } else {
                let vertices: Vec<Point<Real>> =
                    chain.iter().map(|v| point![v.x, v.y]).collect();
                ColliderBuilder::polyline(vertices, None)
            };
            self.collider_set.insert_with_parent(
                collider.collision_groups(groups).build(),
                self.terrain_body,
                &mut self.rigid_body_set,
            );
        }
    }

    /// Spawn a dynamic box; `width`/`height` are full extents in metres.
    pub fn create_box(&mut self, x: f32, y: f32, width: f32, height: f32) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![x, y])
            .build();
        let handle = self.rigid_body_set.insert(body);

        let collider = ColliderBuilder::cuboid(width * 0.5, height * 0.5)
            .density(1.0)
            .friction(0.3)
            .restitution(0.2)
            .collision_groups(InteractionGroups::new(
                filter::DYNAMIC,
                filter::TERRAIN | filter::DYNAMIC | filter::DEBRIS,
            ))
            .build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);

        self.dynamic_bodies.push(handle);
        log::debug!("Created {}x{} box at ({:.2}, {:.2})", width, height, x, y);
        handle
    }

    /// Spawn a debris circle with an initial velocity.
    pub fn create_debris_body(
        &mut self,
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
        radius: f32,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![x, y])
            .linvel(vector![vx, vy])
            .build();
        let handle = self.rigid_body_set.insert(body);

        let collider = ColliderBuilder::ball(radius)
            .density(0.001)
            .friction(0.5)
            .restitution(0.3)
            .collision_groups(InteractionGroups::new(
                filter::DEBRIS,
                filter::TERRAIN | filter::DYNAMIC,
            ))
            .build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        handle
    }

    /// Remove a body and everything attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        if self.rigid_body_set.get(handle).is_none() {
            return;
        }
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.dynamic_bodies.retain(|&h| h != handle);
    }

    pub fn contains(&self, handle: RigidBodyHandle) -> bool {
        self.rigid_body_set.get(handle).is_some()
    }

    pub fn translation(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        self.rigid_body_set
            .get(handle)
            .map(|body| Vec2::new(body.translation().x, body.translation().y))
    }

    pub fn linvel(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        self.rigid_body_set
            .get(handle)
            .map(|body| Vec2::new(body.linvel().x, body.linvel().y))
    }

    pub fn set_linvel(&mut self, handle: RigidBodyHandle, velocity: Vec2) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_linvel(vector![velocity.x, velocity.y], true);
        }
    }

    /// Transform a body-local point into world space.
    pub fn transform_point(&self, handle: RigidBodyHandle, local: Vec2) -> Option<Vec2> {
        self.rigid_body_set.get(handle).map(|body| {
            let p = body.position() * point![local.x, local.y];
            Vec2::new(p.x, p.y)
        })
    }

    /// World-space AABB over all of a body's colliders.
    pub fn body_aabb(&self, handle: RigidBodyHandle) -> Option<(Vec2, Vec2)> {
        let body = self.rigid_body_set.get(handle)?;
        let mut merged: Option<Aabb> = None;
        for &collider_handle in body.colliders() {
            if let Some(collider) = self.collider_set.get(collider_handle) {
                let aabb = collider.compute_aabb();
                merged = Some(match merged {
                    Some(acc) => acc.merged(&aabb),
                    None => aabb,
                });
            }
        }
        merged.map(|aabb| {
            (
                Vec2::new(aabb.mins.x, aabb.mins.y),
                Vec2::new(aabb.maxs.x, aabb.maxs.y),
            )
        })
    }

    /// Point-in-shape test over all of a body's colliders.
    pub fn point_in_body(&self, handle: RigidBodyHandle, point: Vec2) -> bool {
        let Some(body) = self.rigid_body_set.get(handle) else {
            return false;
        };
        let p = point![point.x, point.y];
        body.colliders().iter().any(|&collider_handle| {
            self.collider_set
                .get(collider_handle)
                .is_some_and(|collider| collider.shape().contains_point(collider.position(), &p))
        })
    }

    pub fn terrain_shape_count(&self) -> usize {
        self.rigid_body_set[self.terrain_body].colliders().len()
    }

    pub fn dynamic_body_count(&self) -> usize {
        self.dynamic_bodies.len()
    }
}
