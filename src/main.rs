use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use grainfall::{Material, SimConfig, Simulation};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run n iterations of the scripted sand+water spawner, then exit
    #[arg(long)]
    benchmark: Option<u32>,

    /// World width in 64-cell chunks
    #[arg(long, default_value_t = 7)]
    chunks_x: usize,

    /// World height in 64-cell chunks
    #[arg(long, default_value_t = 5)]
    chunks_y: usize,

    /// RON config preset to load instead of the defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };

    match args.benchmark {
        Some(iterations) => run_benchmark(&args, config, iterations),
        None => run_headless(&args, config),
    }
}

fn run_benchmark(args: &Args, config: SimConfig, iterations: u32) -> anyhow::Result<()> {
    log::info!("Benchmark mode enabled: {} iterations", iterations);
    let sim = Simulation::with_benchmark(args.chunks_x, args.chunks_y, config, iterations);

    while !sim.benchmark_complete() {
        std::thread::sleep(Duration::from_millis(250));
        log_stats(&sim);
    }
    let stats = sim.stats();
    log::info!(
        "Benchmark finished after {} steps ({:.1} SPS)",
        stats.step_count,
        stats.sps
    );
    Ok(())
}

/// Without a renderer attached, free-run the world with a little seed
/// terrain and report stats until the process is killed.
fn run_headless(args: &Args, config: SimConfig) -> anyhow::Result<()> {
    let ppm = config.pixels_per_meter;
    let sim = Simulation::new(args.chunks_x, args.chunks_y, config);

    let width = (args.chunks_x * 64) as i32;
    let height = (args.chunks_y * 64) as i32;
    sim.paint_disc(width / 2, height / 3, 20, Material::Sand);
    sim.paint_disc(width / 3, height / 4, 15, Material::Water);
    sim.spawn_box(
        width as f32 / ppm / 2.0,
        height as f32 / ppm / 4.0,
        1.0,
        1.0,
        Material::Wood,
    );

    log::info!("Running headless; Ctrl-C to stop");
    loop {
        std::thread::sleep(Duration::from_secs(1));
        log_stats(&sim);
    }
}

fn log_stats(sim: &Simulation) {
    let stats = sim.stats();
    log::info!(
        "{:.1} SPS | step {} | bodies {} | shapes {} | chains {} | debris {} | mesh {} ms | physics {} ms",
        stats.sps,
        stats.step_count,
        stats.dynamic_bodies,
        stats.terrain_shapes,
        stats.chain_count,
        stats.debris,
        stats.mesh_ms,
        stats.physics_ms
    );
}
