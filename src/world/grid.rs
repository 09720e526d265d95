//! Grid - the world-sized cell store with chunked dirty-tracking

use std::mem;
use std::sync::Arc;

use super::{Cell, Chunk, Material, CHUNK_SIZE};

/// The chunk storage behind a [`Grid`].
///
/// During a parallel pass the storage is moved behind an `Arc` so worker
/// tasks can read neighbouring chunks while each task owns the cells of the
/// chunk it updates (taken out of its slot beforehand). Reads of a missing
/// or vacated chunk resolve to stone, which nothing ever moves into.
#[derive(Clone, Default)]
pub(crate) struct GridFrame {
    chunks_x: usize,
    chunks_y: usize,
    chunks: Vec<Option<Chunk>>,
}

impl GridFrame {
    fn new(chunks_x: usize, chunks_y: usize) -> Self {
        let mut chunks = Vec::with_capacity(chunks_x * chunks_y);
        for cy in 0..chunks_y {
            for cx in 0..chunks_x {
                chunks.push(Some(Chunk::new(cx as i32, cy as i32)));
            }
        }
        Self {
            chunks_x,
            chunks_y,
            chunks,
        }
    }

    #[inline]
    pub(crate) fn width(&self) -> usize {
        self.chunks_x * CHUNK_SIZE
    }

    #[inline]
    pub(crate) fn height(&self) -> usize {
        self.chunks_y * CHUNK_SIZE
    }

    #[inline]
    fn chunk_index(&self, cx: usize, cy: usize) -> usize {
        cy * self.chunks_x + cx
    }

    #[inline]
    pub(crate) fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width() && (y as usize) < self.height()
    }

    /// Read a cell; out-of-bounds and vacated chunks read as stone so the
    /// automaton treats everything outside the world as border.
    #[inline]
    pub(crate) fn cell(&self, x: i32, y: i32) -> Cell {
        if !self.in_bounds(x, y) {
            return Cell::STONE;
        }
        let (cx, cy) = (x as usize / CHUNK_SIZE, y as usize / CHUNK_SIZE);
        match &self.chunks[self.chunk_index(cx, cy)] {
            Some(chunk) => chunk.get(x as usize % CHUNK_SIZE, y as usize % CHUNK_SIZE),
            None => Cell::STONE,
        }
    }
}

/// The mutable world grid.
///
/// Owns all cell storage plus the per-chunk updated bitsets and mesh-dirty
/// flags. Border cells are always stone; writes to them are ignored.
pub struct Grid {
    frame: GridFrame,
}

impl Grid {
    /// Create a `chunks_x` x `chunks_y` chunk world with a stone border.
    pub fn new(chunks_x: usize, chunks_y: usize) -> Self {
        let chunks_x = chunks_x.max(1);
        let chunks_y = chunks_y.max(1);
        let mut grid = Self {
            frame: GridFrame::new(chunks_x, chunks_y),
        };
        grid.stamp_border();
        log::info!(
            "Created {}x{} grid ({}x{} chunks)",
            grid.width(),
            grid.height(),
            chunks_x,
            chunks_y
        );
        grid
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.frame.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    #[inline]
    pub fn chunks_x(&self) -> usize {
        self.frame.chunks_x
    }

    #[inline]
    pub fn chunks_y(&self) -> usize {
        self.frame.chunks_y
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.frame.in_bounds(x, y)
    }

    /// Whether the coordinate lies on the permanent stone border.
    #[inline]
    pub fn is_border(&self, x: i32, y: i32) -> bool {
        x == 0
            || y == 0
            || x == self.width() as i32 - 1
            || y == self.height() as i32 - 1
    }

    /// Read a cell. Out-of-bounds reads resolve to stone.
    #[inline]
    pub fn cell(&self, x: i32, y: i32) -> Cell {
        self.frame.cell(x, y)
    }

    /// Set a cell to a terrain material (body 0).
    ///
    /// Ignored on the stone border and outside the grid.
    pub fn set_cell(&mut self, x: i32, y: i32, material: Material) {
        self.write_cell(x, y, Cell::new(material));
    }

    /// Write a full cell, including body id and lifetime bits.
    ///
    /// Same border/bounds policy as [`Grid::set_cell`]. Marks mesh-dirty
    /// chunks whenever a meshed solid appears or disappears.
    pub(crate) fn write_cell(&mut self, x: i32, y: i32, cell: Cell) {
        if !self.in_bounds(x, y) || self.is_border(x, y) {
            return;
        }
        let old = self.frame.cell(x, y);
        self.write_cell_raw(x, y, cell);
        if old.is_meshed() || cell.is_meshed() {
            self.mark_solid_dirty(x, y);
        }
    }

    /// Raw cell write without border or dirty bookkeeping. Used when the
    /// caller tracks dirty marks itself (deferred cross-chunk moves).
    pub(crate) fn write_cell_raw(&mut self, x: i32, y: i32, cell: Cell) {
        if !self.frame.in_bounds(x, y) {
            return;
        }
        let (cx, cy) = (x as usize / CHUNK_SIZE, y as usize / CHUNK_SIZE);
        let idx = self.frame.chunk_index(cx, cy);
        if let Some(chunk) = &mut self.frame.chunks[idx] {
            chunk.set(x as usize % CHUNK_SIZE, y as usize % CHUNK_SIZE, cell);
        } else {
            log::error!("write into vacated chunk ({}, {})", cx, cy);
        }
    }

    /// Mark the chunk containing `(x, y)` mesh-dirty, plus edge neighbours
    /// when the cell sits on a chunk boundary: their mesh looks across it.
    pub(crate) fn mark_solid_dirty(&mut self, x: i32, y: i32) {
        if !self.frame.in_bounds(x, y) {
            return;
        }
        let (lx, ly) = (x as usize % CHUNK_SIZE, y as usize % CHUNK_SIZE);
        let (cx, cy) = (x as usize / CHUNK_SIZE, y as usize / CHUNK_SIZE);
        self.mark_chunk_dirty(cx as i32, cy as i32);
        if lx == 0 {
            self.mark_chunk_dirty(cx as i32 - 1, cy as i32);
        }
        if lx == CHUNK_SIZE - 1 {
            self.mark_chunk_dirty(cx as i32 + 1, cy as i32);
        }
        if ly == 0 {
            self.mark_chunk_dirty(cx as i32, cy as i32 - 1);
        }
        if ly == CHUNK_SIZE - 1 {
            self.mark_chunk_dirty(cx as i32, cy as i32 + 1);
        }
    }

    fn mark_chunk_dirty(&mut self, cx: i32, cy: i32) {
        if cx < 0 || cy < 0 || cx as usize >= self.frame.chunks_x || cy as usize >= self.frame.chunks_y
        {
            return;
        }
        let idx = self.frame.chunk_index(cx as usize, cy as usize);
        if let Some(chunk) = &mut self.frame.chunks[idx] {
            chunk.mesh_dirty = true;
        }
    }

    /// Mark a cell's updated-this-step bit.
    pub(crate) fn mark_updated(&mut self, x: i32, y: i32) {
        if !self.frame.in_bounds(x, y) {
            return;
        }
        let (cx, cy) = (x as usize / CHUNK_SIZE, y as usize / CHUNK_SIZE);
        let idx = self.frame.chunk_index(cx, cy);
        if let Some(chunk) = &mut self.frame.chunks[idx] {
            chunk.mark_updated(x as usize % CHUNK_SIZE, y as usize % CHUNK_SIZE);
        }
    }

    /// Clear every updated bit; called at the start of each step.
    pub(crate) fn clear_updated(&mut self) {
        for chunk in self.frame.chunks.iter_mut().flatten() {
            chunk.clear_updated();
        }
    }

    /// Drain the mesh-dirty flags, returning the dirty chunk coordinates.
    pub(crate) fn take_dirty_chunks(&mut self) -> Vec<(usize, usize)> {
        let mut dirty = Vec::new();
        for cy in 0..self.frame.chunks_y {
            for cx in 0..self.frame.chunks_x {
                let idx = self.frame.chunk_index(cx, cy);
                if let Some(chunk) = &mut self.frame.chunks[idx] {
                    if chunk.mesh_dirty {
                        chunk.mesh_dirty = false;
                        dirty.push((cx, cy));
                    }
                }
            }
        }
        dirty
    }

    /// Refill the world with air and re-stamp the stone border.
    pub fn clear(&mut self) {
        for chunk in self.frame.chunks.iter_mut().flatten() {
            chunk.fill(Cell::AIR);
            chunk.clear_updated();
            chunk.mesh_dirty = true;
        }
        self.stamp_border();
        log::info!("Grid cleared");
    }

    fn stamp_border(&mut self) {
        let (w, h) = (self.width() as i32, self.height() as i32);
        for x in 0..w {
            self.write_cell_raw(x, 0, Cell::STONE);
            self.write_cell_raw(x, h - 1, Cell::STONE);
        }
        for y in 0..h {
            self.write_cell_raw(0, y, Cell::STONE);
            self.write_cell_raw(w - 1, y, Cell::STONE);
        }
    }

    /// Paint a filled disc of `material`. Border and out-of-bounds cells are
    /// skipped silently.
    pub fn paint_disc(&mut self, x: i32, y: i32, radius: i32, material: Material) {
        let radius = radius.max(0);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_cell(x + dx, y + dy, material);
                }
            }
        }
    }

    pub fn count_material(&self, material: Material) -> usize {
        let mut count = 0;
        for y in 0..self.height() as i32 {
            for x in 0..self.width() as i32 {
                if self.cell(x, y).material == material {
                    count += 1;
                }
            }
        }
        count
    }

    pub fn count_non_air(&self) -> usize {
        self.frame
            .chunks
            .iter()
            .flatten()
            .map(|c| c.count_non_air())
            .sum()
    }

    /// Take a chunk's cells out of the grid for a parallel pass.
    pub(crate) fn take_chunk(&mut self, cx: usize, cy: usize) -> Option<Chunk> {
        let idx = self.frame.chunk_index(cx, cy);
        self.frame.chunks[idx].take()
    }

    /// Return a taken chunk to its slot.
    pub(crate) fn put_chunk(&mut self, cx: usize, cy: usize, chunk: Chunk) {
        let idx = self.frame.chunk_index(cx, cy);
        self.frame.chunks[idx] = Some(chunk);
    }

    /// Move the storage behind an `Arc` for worker tasks to read.
    pub(crate) fn begin_frame(&mut self) -> Arc<GridFrame> {
        Arc::new(mem::take(&mut self.frame))
    }

    /// Restore the storage after all tasks finished (and dropped their
    /// `Arc` clones). A still-shared frame is a scheduling bug; recover by
    /// cloning rather than aborting.
    pub(crate) fn end_frame(&mut self, frame: Arc<GridFrame>) {
        self.frame = match Arc::try_unwrap(frame) {
            Ok(frame) => frame,
            Err(shared) => {
                log::error!("grid frame still shared after phase barrier");
                (*shared).clone()
            }
        };
    }
}
