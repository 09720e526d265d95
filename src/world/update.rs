//! Four-phase parallel chunk update
//!
//! Chunks are partitioned by coordinate parity into four classes; within a
//! phase only one class runs, so concurrently updated chunks are at least a
//! full chunk apart and their read/write ranges (at most `water_max_dist`
//! cells past their own border) can never overlap.
//!
//! Each worker task owns the cells of its chunk for the duration of the
//! phase. Reads into neighbouring chunks see the pre-phase state through a
//! shared frame; writes into neighbours are queued and applied after the
//! phase barrier, with an overlay so the task observes its own queued
//! writes.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::grid::GridFrame;
use super::rules::CellRules;
use super::{Cell, Chunk, Grid, Material, CHUNK_SIZE};
use crate::config::SimConfig;
use crate::worker_pool::WorkerPool;

/// The rule tunables a worker task needs, copied out of [`SimConfig`].
#[derive(Clone, Copy)]
pub(crate) struct RuleParams {
    pub water_max_dist: u32,
    pub water_spread_falloff: u32,
}

impl RuleParams {
    fn from_config(config: &SimConfig) -> Self {
        Self {
            water_max_dist: config.water_max_dist,
            water_spread_falloff: config.water_spread_falloff,
        }
    }
}

/// A write that crossed the task's chunk border and must be applied after
/// the phase barrier.
enum DeferredWrite {
    Cell { x: i32, y: i32, cell: Cell },
    Updated { x: i32, y: i32 },
}

/// What a finished task hands back to the scheduler.
struct TaskResult {
    cx: usize,
    cy: usize,
    chunk: Chunk,
    deferred: Vec<DeferredWrite>,
    /// Cell coordinates where a meshed solid changed.
    dirty: Vec<(i32, i32)>,
}

/// One chunk's view of the grid during a phase.
pub(crate) struct ChunkTask {
    origin_x: i32,
    origin_y: i32,
    chunk: Chunk,
    frame: Arc<GridFrame>,
    overlay: HashMap<(i32, i32), Cell>,
    deferred: Vec<DeferredWrite>,
    dirty: Vec<(i32, i32)>,
    rng: SmallRng,
    params: RuleParams,
}

impl ChunkTask {
    fn new(cx: usize, cy: usize, chunk: Chunk, frame: Arc<GridFrame>, seed: u64, params: RuleParams) -> Self {
        Self {
            origin_x: (cx * CHUNK_SIZE) as i32,
            origin_y: (cy * CHUNK_SIZE) as i32,
            chunk,
            frame,
            overlay: HashMap::new(),
            deferred: Vec::new(),
            dirty: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
            params,
        }
    }

    #[inline]
    fn owns(&self, x: i32, y: i32) -> bool {
        x >= self.origin_x
            && y >= self.origin_y
            && x < self.origin_x + CHUNK_SIZE as i32
            && y < self.origin_y + CHUNK_SIZE as i32
    }

    pub(crate) fn cell(&self, x: i32, y: i32) -> Cell {
        if self.owns(x, y) {
            self.chunk
                .get((x - self.origin_x) as usize, (y - self.origin_y) as usize)
        } else if let Some(cell) = self.overlay.get(&(x, y)) {
            *cell
        } else {
            self.frame.cell(x, y)
        }
    }

    pub(crate) fn set_cell(&mut self, x: i32, y: i32, cell: Cell) {
        let old = self.cell(x, y);
        if self.owns(x, y) {
            self.chunk
                .set((x - self.origin_x) as usize, (y - self.origin_y) as usize, cell);
        } else {
            self.overlay.insert((x, y), cell);
            self.deferred.push(DeferredWrite::Cell { x, y, cell });
        }
        if old.is_meshed() || cell.is_meshed() {
            self.dirty.push((x, y));
        }
    }

    pub(crate) fn mark_updated(&mut self, x: i32, y: i32) {
        if self.owns(x, y) {
            self.chunk
                .mark_updated((x - self.origin_x) as usize, (y - self.origin_y) as usize);
        } else {
            self.deferred.push(DeferredWrite::Updated { x, y });
        }
    }

    #[inline]
    pub(crate) fn params(&self) -> RuleParams {
        self.params
    }

    #[inline]
    pub(crate) fn rng_bool(&mut self) -> bool {
        self.rng.gen()
    }

    #[inline]
    pub(crate) fn rng_under(&mut self, n: u32) -> u32 {
        self.rng.gen_range(0..n.max(1))
    }

    /// Scan the chunk bottom-up and run the material rule on each live
    /// cell. The x direction flips per chunk on a PRNG bit to break lateral
    /// dispatch bias.
    fn run(&mut self) {
        let flip_x: bool = self.rng.gen();
        for j in (0..CHUNK_SIZE).rev() {
            for step in 0..CHUNK_SIZE {
                let i = if flip_x { CHUNK_SIZE - 1 - step } else { step };
                if self.chunk.is_updated(i, j) {
                    continue;
                }
                let cell = self.chunk.get(i, j);
                if cell.body != 0 {
                    // rigid-body pixels are static until the body releases them
                    continue;
                }
                let (x, y) = (self.origin_x + i as i32, self.origin_y + j as i32);
                match cell.material {
                    Material::Sand => CellRules::update_sand(self, x, y),
                    Material::Water => CellRules::update_water(self, x, y),
                    _ => {}
                }
            }
        }
    }

    fn finish(self, cx: usize, cy: usize) -> TaskResult {
        TaskResult {
            cx,
            cy,
            chunk: self.chunk,
            deferred: self.deferred,
            dirty: self.dirty,
        }
    }
}

/// Orders chunk updates into four non-conflicting phases and dispatches
/// them to the worker pool.
pub struct ChunkScheduler;

impl ChunkScheduler {
    /// Run one full cellular-automaton step over the grid.
    pub fn update(grid: &mut Grid, pool: &WorkerPool, config: &SimConfig, step: u64) {
        grid.clear_updated();

        let (chunks_x, chunks_y) = (grid.chunks_x(), grid.chunks_y());
        let params = RuleParams::from_config(config);
        let flip_rows = step & 1 != 0;
        let flip_cols = step & 2 != 0;

        for phase_y in 0..2usize {
            for phase_x in 0..2usize {
                let mut rows: Vec<usize> = (phase_y..chunks_y).step_by(2).collect();
                if flip_rows {
                    rows.reverse();
                }
                let mut cols: Vec<usize> = (phase_x..chunks_x).step_by(2).collect();
                if flip_cols {
                    cols.reverse();
                }

                let mut taken = Vec::new();
                for &cy in &rows {
                    for &cx in &cols {
                        if let Some(chunk) = grid.take_chunk(cx, cy) {
                            taken.push((cx, cy, chunk));
                        }
                    }
                }
                if taken.is_empty() {
                    continue;
                }

                let frame = grid.begin_frame();
                let results: Arc<Mutex<Vec<TaskResult>>> =
                    Arc::new(Mutex::new(Vec::with_capacity(taken.len())));

                for (cx, cy, chunk) in taken {
                    let frame = Arc::clone(&frame);
                    let results = Arc::clone(&results);
                    let seed = task_seed(config.seed, step, (cy * chunks_x + cx) as u64);
                    pool.enqueue(move || {
                        let mut task = ChunkTask::new(cx, cy, chunk, frame, seed, params);
                        task.run();
                        results
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(task.finish(cx, cy));
                    });
                }
                pool.wait_all();
                grid.end_frame(frame);

                let results = std::mem::take(
                    &mut *results.lock().unwrap_or_else(PoisonError::into_inner),
                );
                for result in results {
                    grid.put_chunk(result.cx, result.cy, result.chunk);
                    for write in result.deferred {
                        match write {
                            DeferredWrite::Cell { x, y, cell } => grid.write_cell_raw(x, y, cell),
                            DeferredWrite::Updated { x, y } => grid.mark_updated(x, y),
                        }
                    }
                    for (x, y) in result.dirty {
                        grid.mark_solid_dirty(x, y);
                    }
                }
            }
        }
    }
}

/// Mix the base seed, step counter and chunk index into a task seed
/// (splitmix64 finalizer). Identical for any worker count, so replays only
/// depend on the config seed and the input sequence.
fn task_seed(base: u64, step: u64, chunk_index: u64) -> u64 {
    let mut z = base
        ^ step.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ chunk_index.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
