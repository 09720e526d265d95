//! World management - cells, chunks, the grid and the cellular automaton

mod chunk;
mod grid;
mod material;
mod rules;
mod update;

pub use chunk::{Cell, Chunk, CHUNK_AREA, CHUNK_SIZE};
pub use grid::Grid;
pub(crate) use grid::GridFrame;
pub use material::Material;
pub use update::ChunkScheduler;
