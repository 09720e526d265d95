//! Terrain boundary meshing - solid pixels to collider chains
//!
//! Every dirty chunk is re-meshed in parallel on the worker pool; clean
//! chunks reuse their cached chains. Chains are polylines in world metres,
//! oriented with the solid on the right, ready to attach to the physics
//! terrain body.

mod extractor;
mod simplify;

use glam::Vec2;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::SimConfig;
use crate::worker_pool::WorkerPool;
use crate::world::Grid;

pub use simplify::simplify_chain;

/// An ordered polyline of world-space vertices (metres). A chain whose
/// first and last vertex coincide is a closed boundary loop.
pub type Chain = Vec<Vec2>;

#[derive(Default, Clone)]
struct ChunkChains {
    chains: Vec<Chain>,
    populated: bool,
}

/// Extracts and caches boundary chains per chunk.
pub struct MeshExtractor {
    chunks_x: usize,
    cache: Vec<ChunkChains>,
}

impl MeshExtractor {
    pub fn new(chunks_x: usize, chunks_y: usize) -> Self {
        Self {
            chunks_x,
            cache: vec![ChunkChains::default(); chunks_x * chunks_y],
        }
    }

    /// Drop all cached chains; the next extraction rebuilds every chunk
    /// that the grid reports dirty.
    pub fn clear(&mut self) {
        for slot in &mut self.cache {
            *slot = ChunkChains::default();
        }
    }

    /// Total number of cached chains.
    pub fn chain_count(&self) -> usize {
        self.cache.iter().map(|slot| slot.chains.len()).sum()
    }

    /// Re-mesh the grid's dirty chunks and return the chains of the whole
    /// world, cached chunks included.
    pub fn extract(&mut self, grid: &mut Grid, pool: &WorkerPool, config: &SimConfig) -> Vec<Chain> {
        let dirty = grid.take_dirty_chunks();
        if !dirty.is_empty() {
            log::trace!("Re-meshing {} dirty chunks", dirty.len());
            let frame = grid.begin_frame();
            let results: Arc<Mutex<Vec<(usize, Vec<Chain>)>>> =
                Arc::new(Mutex::new(Vec::with_capacity(dirty.len())));

            for (cx, cy) in dirty {
                let frame = Arc::clone(&frame);
                let results = Arc::clone(&results);
                let index = cy * self.chunks_x + cx;
                let pixels_per_meter = config.pixels_per_meter;
                let epsilon = config.simplify_epsilon;
                pool.enqueue(move || {
                    let chains = extractor::mesh_chunk(&frame, cx, cy, pixels_per_meter, epsilon);
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, chains));
                });
            }
            pool.wait_all();
            grid.end_frame(frame);

            let results =
                std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
            for (index, chains) in results {
                self.cache[index] = ChunkChains {
                    chains,
                    populated: true,
                };
            }
        }

        self.cache
            .iter()
            .filter(|slot| slot.populated)
            .flat_map(|slot| slot.chains.iter().cloned())
            .collect()
    }
}
