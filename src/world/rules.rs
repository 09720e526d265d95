//! Cell movement rules - sand and water behaviour

use super::update::ChunkTask;
use super::Material;

/// Per-material movement rules.
///
/// Rules run once per cell per step, against a [`ChunkTask`] view that
/// resolves reads across chunk borders and queues cross-chunk writes.
pub(crate) struct CellRules;

impl CellRules {
    /// Sand falls straight down, then diagonally. Falling into water swaps
    /// the two cells and immediately re-runs the water rule on the displaced
    /// water so it flows aside instead of migrating upwards.
    pub(crate) fn update_sand(task: &mut ChunkTask, x: i32, y: i32) {
        const DIRS: [(i32, i32); 3] = [(0, 1), (-1, 1), (1, 1)];

        let sand = task.cell(x, y);
        for (dx, dy) in DIRS {
            let (nx, ny) = (x + dx, y + dy);
            let target = task.cell(nx, ny);
            match target.material {
                Material::Air => {
                    task.set_cell(nx, ny, sand);
                    task.set_cell(x, y, target);
                    task.mark_updated(nx, ny);
                    task.mark_updated(x, y);
                    return;
                }
                Material::Water => {
                    task.set_cell(nx, ny, sand);
                    task.set_cell(x, y, target);
                    task.mark_updated(nx, ny);
                    task.mark_updated(x, y);
                    Self::update_water(task, x, y);
                    return;
                }
                _ => {}
            }
        }
    }

    /// Water falls if it can, otherwise probes a lateral spread path in a
    /// random primary direction, preferring a diagonal drop at every probed
    /// column and falling back to the farthest open horizontal cell.
    pub(crate) fn update_water(task: &mut ChunkTask, x: i32, y: i32) {
        let water = task.cell(x, y);
        let below = task.cell(x, y + 1);
        if below.material.is_air() {
            task.set_cell(x, y + 1, water);
            task.set_cell(x, y, below);
            task.mark_updated(x, y + 1);
            return;
        }

        let dir = if task.rng_bool() { 1 } else { -1 };
        for d in [dir, -dir] {
            if let Some((tx, ty)) = Self::probe_spread(task, x, y, d) {
                let target = task.cell(tx, ty);
                task.set_cell(tx, ty, water);
                task.set_cell(x, y, target);
                task.mark_updated(tx, ty);
                return;
            }
        }
    }

    /// Walk up to `water_max_dist` columns in `dir`. A diagonal drop ends
    /// the probe immediately; a blocked corridor aborts it. Horizontal
    /// cells become landing candidates from the second column on, which is
    /// what reduces `water_max_dist = 1` to fall-or-diagonal-only.
    fn probe_spread(task: &mut ChunkTask, x: i32, y: i32, dir: i32) -> Option<(i32, i32)> {
        let max_dist = task.params().water_max_dist as i32;
        let mut landing = None;

        for step in 1..=max_dist {
            if step > 1 && !Self::spread_gate(task, step) {
                break;
            }
            let nx = x + dir * step;
            if task.cell(nx, y + 1).material.is_air() {
                return Some((nx, y + 1));
            }
            if !task.cell(nx, y).material.is_air() {
                break;
            }
            if step > 1 {
                landing = Some((nx, y));
            }
        }
        landing
    }

    /// Falloff gate for probe continuation past column `step`.
    ///
    /// With falloff 1 the gate always passes (full spread); once
    /// `falloff >= water_max_dist + 1` the integer division zeroes out and
    /// the probe never goes beyond the first column. In between, reach
    /// shrinks with the falloff, randomized near the tail.
    fn spread_gate(task: &mut ChunkTask, step: i32) -> bool {
        let params = task.params();
        let remaining = params.water_max_dist + 1 - step as u32;
        remaining / params.water_spread_falloff > 0
            && task.rng_under(params.water_spread_falloff) < remaining
    }
}
