//! Simulation scheduler - the dedicated simulation thread and its controls

mod core;
mod stats;

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

pub use self::core::{PhaseReport, SimCore};
pub use self::stats::{SimStats, StatsSnapshot};

use crate::config::SimConfig;
use crate::world::{Grid, Material};

struct BenchmarkState {
    iterations: u32,
    current: AtomicU32,
    done: AtomicBool,
}

struct SimShared {
    core: Mutex<SimCore>,
    stats: SimStats,
    running: AtomicBool,
    fixed_steps: AtomicBool,
    steps_remaining: AtomicI32,
    gate: Mutex<()>,
    gate_cv: Condvar,
    benchmark: Option<BenchmarkState>,
}

fn lock_core(shared: &SimShared) -> MutexGuard<'_, SimCore> {
    shared.core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host-facing handle to a simulation world.
///
/// Owns the simulation thread. The thread free-runs by default; in fixed
/// steps mode it sleeps on a condition variable until the host releases a
/// step budget with [`Simulation::request_steps`]. Dropping the handle
/// shuts the thread down cooperatively.
pub struct Simulation {
    shared: Arc<SimShared>,
    thread: Option<JoinHandle<()>>,
    /// Host frame counter for negative step rates (1 step every n frames).
    frame_counter: i32,
}

impl Simulation {
    /// Create a world of `chunks_x` x `chunks_y` chunks and start its
    /// simulation thread.
    pub fn new(chunks_x: usize, chunks_y: usize, config: SimConfig) -> Self {
        Self::spawn(chunks_x, chunks_y, config, None)
    }

    /// Like [`Simulation::new`], with the scripted benchmark spawner
    /// enabled for `iterations` steps.
    pub fn with_benchmark(
        chunks_x: usize,
        chunks_y: usize,
        config: SimConfig,
        iterations: u32,
    ) -> Self {
        Self::spawn(chunks_x, chunks_y, config, Some(iterations))
    }

    fn spawn(
        chunks_x: usize,
        chunks_y: usize,
        config: SimConfig,
        benchmark_iterations: Option<u32>,
    ) -> Self {
        let shared = Arc::new(SimShared {
            core: Mutex::new(SimCore::new(chunks_x, chunks_y, config)),
            stats: SimStats::new(),
            running: AtomicBool::new(true),
            fixed_steps: AtomicBool::new(false),
            steps_remaining: AtomicI32::new(0),
            gate: Mutex::new(()),
            gate_cv: Condvar::new(),
            benchmark: benchmark_iterations.map(|iterations| BenchmarkState {
                iterations,
                current: AtomicU32::new(0),
                done: AtomicBool::new(false),
            }),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("grainfall-sim".into())
            .spawn(move || run_loop(&thread_shared))
            .ok();
        if thread.is_none() {
            log::error!("failed to spawn the simulation thread");
            shared.running.store(false, Ordering::Release);
        } else {
            log::info!("Simulation thread started");
        }

        Self {
            shared,
            thread,
            frame_counter: 0,
        }
    }

    /// Paint a filled disc of particles; out-of-bounds cells are ignored.
    pub fn paint_disc(&self, x_px: i32, y_px: i32, radius_px: i32, material: Material) {
        lock_core(&self.shared).paint_disc(x_px, y_px, radius_px, material);
    }

    /// Spawn a registered box body. Returns `None` when the 255-body id
    /// space is exhausted.
    pub fn spawn_box(
        &self,
        x_m: f32,
        y_m: f32,
        width_m: f32,
        height_m: f32,
        material: Material,
    ) -> Option<u8> {
        lock_core(&self.shared).spawn_box(x_m, y_m, width_m, height_m, material)
    }

    /// Destroy all bodies and debris and clear the grid.
    pub fn reset(&self) {
        lock_core(&self.shared).reset();
    }

    /// Toggle the step gate. Leaving fixed-steps mode wakes the thread.
    pub fn set_fixed_steps(&self, fixed: bool) {
        self.shared.fixed_steps.store(fixed, Ordering::Release);
        if !fixed {
            self.shared.gate_cv.notify_one();
        }
    }

    /// Release steps to a gated simulation. Positive `n` releases `n`
    /// steps immediately; negative `n` releases one step every `|n|` calls
    /// (the host calls this once per rendered frame).
    pub fn request_steps(&mut self, n: i32) {
        match n {
            0 => {}
            n if n > 0 => {
                self.frame_counter = 0;
                {
                    let _gate = self.shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
                    self.shared.steps_remaining.store(n, Ordering::Release);
                }
                self.shared.gate_cv.notify_one();
            }
            n => {
                self.frame_counter += 1;
                if self.frame_counter >= -n {
                    self.frame_counter = 0;
                    {
                        let _gate =
                            self.shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
                        self.shared.steps_remaining.store(1, Ordering::Release);
                    }
                    self.shared.gate_cv.notify_one();
                }
            }
        }
    }

    /// Run a closure against a read-only view of the grid under the shared
    /// lock (e.g. to copy cells into a render texture).
    pub fn with_grid<R>(&self, reader: impl FnOnce(&Grid) -> R) -> R {
        reader(lock_core(&self.shared).grid())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Whether the scripted benchmark has finished its iterations.
    pub fn benchmark_complete(&self) -> bool {
        self.shared
            .benchmark
            .as_ref()
            .is_some_and(|bench| bench.done.load(Ordering::Acquire))
    }

    fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        {
            let _gate = self.shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
            self.shared.steps_remaining.store(1, Ordering::Release);
        }
        self.shared.gate_cv.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        log::info!("Simulation thread stopped");
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(shared: &SimShared) {
    let mut last_step_count = shared.stats.step_count();
    let mut last_sps_update = Instant::now();

    while shared.running.load(Ordering::Acquire) {
        if shared.fixed_steps.load(Ordering::Acquire) {
            let mut gate = shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if shared.steps_remaining.load(Ordering::Acquire) > 0
                    || !shared.running.load(Ordering::Acquire)
                    || !shared.fixed_steps.load(Ordering::Acquire)
                {
                    break;
                }
                gate = shared
                    .gate_cv
                    .wait(gate)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            drop(gate);

            if !shared.running.load(Ordering::Acquire) {
                break;
            }
            if shared.fixed_steps.load(Ordering::Acquire) {
                shared.steps_remaining.fetch_sub(1, Ordering::AcqRel);
            }
        }

        if let Some(bench) = &shared.benchmark {
            if !bench.done.load(Ordering::Acquire) {
                let iter = bench.current.fetch_add(1, Ordering::Relaxed);
                run_benchmark_iteration(&mut lock_core(shared), iter);
                if iter >= bench.iterations {
                    log::info!("Benchmark complete: {} iterations", bench.iterations);
                    bench.done.store(true, Ordering::Release);
                }
            }
        }

        // each stage locks separately so the host can paint or copy the
        // grid between them
        let mesh_start = Instant::now();
        let chains = lock_core(shared).extract_mesh();
        let mesh_ms = mesh_start.elapsed().as_millis() as u32;

        lock_core(shared).update_grid();

        let physics_start = Instant::now();
        let report = lock_core(shared).physics_phase(&chains);
        let physics_ms = physics_start.elapsed().as_millis() as u32;

        shared.stats.bump_step();
        shared.stats.publish_step(
            report.dynamic_bodies,
            report.terrain_shapes,
            report.debris,
            report.chain_count,
            mesh_ms,
            physics_ms,
        );

        let elapsed = last_sps_update.elapsed();
        if elapsed.as_millis() >= 1000 {
            let steps = shared.stats.step_count() - last_step_count;
            shared
                .stats
                .set_sps(steps as f32 * 1000.0 / elapsed.as_millis() as f32);
            last_step_count = shared.stats.step_count();
            last_sps_update = Instant::now();
        }
    }
}

/// Scripted benchmark input: a water spawner orbiting clockwise and a sand
/// spawner orbiting counter-clockwise around the upper world centre.
fn run_benchmark_iteration(core: &mut SimCore, iteration: u32) {
    let center_x = core.grid().width() as f32 / 2.0;
    let center_y = core.grid().height() as f32 / 2.0 * 0.3;
    let t = iteration as f32 * 0.02;

    let water_x = (center_x + t.cos() * 80.0) as i32;
    let water_y = (center_y + t.sin() * 40.0) as i32;
    let sand_x = (center_x + (-t + std::f32::consts::PI).cos() * 100.0) as i32;
    let sand_y = (center_y + (-t + std::f32::consts::PI).sin() * 50.0) as i32;

    for dy in -5..=5 {
        for dx in -5..=5 {
            core.grid_mut()
                .set_cell(water_x + dx, water_y + dy, Material::Water);
            core.grid_mut()
                .set_cell(sand_x + dx, sand_y + dy, Material::Sand);
        }
    }
}
