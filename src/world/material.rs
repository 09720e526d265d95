//! Particle material kinds and their classification

use serde::{Deserialize, Serialize};

/// The material stored in a grid cell.
///
/// The discriminants are stable and double as texture palette indices for
/// hosts that upload the grid as an image.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Material {
    /// Empty space, particles move through it.
    #[default]
    Air = 0,
    /// Immovable solid, part of the terrain mesh.
    Stone = 1,
    /// Falls and piles up, part of the terrain mesh.
    Sand = 2,
    /// Flows down and spreads laterally; never meshed.
    Water = 3,
    /// Solid used by rigid bodies; meshed only when deposited as terrain.
    Wood = 4,
}

impl Material {
    pub fn is_air(self) -> bool {
        self == Material::Air
    }

    /// Solids that participate in the terrain collision mesh.
    pub fn is_terrain_solid(self) -> bool {
        matches!(self, Material::Stone | Material::Sand | Material::Wood)
    }
}
