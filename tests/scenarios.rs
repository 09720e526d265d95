//! End-to-end simulation scenarios

use grainfall::{DebrisPool, Material, MeshExtractor, PhysicsWorld, SimConfig, SimCore, WorkerPool};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn test_config() -> SimConfig {
    SimConfig {
        seed: 1234,
        worker_threads: 2,
        ..Default::default()
    }
}

fn sand_cells(core: &SimCore) -> Vec<(i32, i32)> {
    let grid = core.grid();
    let mut cells = Vec::new();
    for y in 0..grid.height() as i32 {
        for x in 0..grid.width() as i32 {
            if grid.cell(x, y).material == Material::Sand {
                cells.push((x, y));
            }
        }
    }
    cells
}

#[test]
fn sand_column_collapses_into_a_heap() {
    let mut core = SimCore::new(2, 2, test_config());
    // a 10x20 column of sand high up
    for y in 10..30 {
        for x in 60..70 {
            core.grid_mut().set_cell(x, y, Material::Sand);
        }
    }
    assert_eq!(core.grid().count_material(Material::Sand), 200);

    for _ in 0..400 {
        core.step();
    }

    let cells = sand_cells(&core);
    assert_eq!(cells.len(), 200, "sand is conserved");
    assert!(
        cells.iter().all(|&(_, y)| y >= 30),
        "no sand may remain above its drop height"
    );
    // the heap rests on the floor and has spread well past the column width
    let base_width = cells.iter().filter(|&&(_, y)| y == 126).count();
    assert!(base_width >= 18, "heap base only {} wide", base_width);
}

#[test]
fn water_fills_a_stone_bowl_and_levels_out() {
    let mut core = SimCore::new(2, 2, test_config());
    // bowl: walls at x=30 and x=60, floor at y=100
    for y in 70..=100 {
        core.grid_mut().set_cell(30, y, Material::Stone);
        core.grid_mut().set_cell(60, y, Material::Stone);
    }
    for x in 30..=60 {
        core.grid_mut().set_cell(x, 100, Material::Stone);
    }
    // 200 water cells poured above the bowl centre
    for y in 10..30 {
        for x in 41..=50 {
            core.grid_mut().set_cell(x, y, Material::Water);
        }
    }
    assert_eq!(core.grid().count_material(Material::Water), 200);

    for _ in 0..800 {
        core.step();
    }

    let grid = core.grid();
    assert_eq!(grid.count_material(Material::Water), 200, "water conserved");
    for y in 0..grid.height() as i32 {
        for x in 0..grid.width() as i32 {
            if grid.cell(x, y).material == Material::Water {
                assert!(
                    (31..=59).contains(&x) && (92..=99).contains(&y),
                    "water escaped the bowl at ({}, {})",
                    x,
                    y
                );
            }
        }
    }
    // the bottom rows are completely full: the surface levelled
    for y in 95..=99 {
        for x in 31..=59 {
            assert_eq!(
                grid.cell(x, y).material,
                Material::Water,
                "hole in the settled water at ({}, {})",
                x,
                y
            );
        }
    }
}

#[test]
fn sand_grain_sinks_through_water() {
    let mut core = SimCore::new(2, 2, test_config());
    // a water tank against the bottom border, walled at x=19 and x=41
    for y in 100..=126 {
        core.grid_mut().set_cell(19, y, Material::Stone);
        core.grid_mut().set_cell(41, y, Material::Stone);
    }
    for y in 107..=126 {
        for x in 20..=40 {
            core.grid_mut().set_cell(x, y, Material::Water);
        }
    }
    let water_before = core.grid().count_material(Material::Water);
    assert_eq!(water_before, 21 * 20);

    core.grid_mut().set_cell(30, 50, Material::Sand);

    for _ in 0..200 {
        core.step();
    }

    let grid = core.grid();
    assert_eq!(grid.count_material(Material::Sand), 1);
    assert_eq!(grid.count_material(Material::Water), water_before);
    assert_eq!(
        grid.cell(30, 126).material,
        Material::Sand,
        "the grain must reach the tank floor"
    );
    // exactly one water cell was pushed up onto the surface row
    let risen = (20..=40)
        .filter(|&x| grid.cell(x, 106).material == Material::Water)
        .count();
    assert_eq!(risen, 1);
}

#[test]
fn box_dropped_into_sand_ejects_debris_above_its_top() {
    let mut core = SimCore::new(2, 2, test_config());
    // 30x30 block of sand centred at (64, 64)
    for y in 49..=78 {
        for x in 49..=78 {
            core.grid_mut().set_cell(x, y, Material::Sand);
        }
    }
    let sand_before = core.grid().count_material(Material::Sand);

    // 0.5 m box centred inside the block: its 16x16 pixel footprint is
    // fully buried
    let id = core.spawn_box(2.0, 2.0, 0.5, 0.5, Material::Wood);
    assert_eq!(id, Some(1));

    let report = core.step();
    assert_eq!(report.displaced, 256, "the whole footprint was displaced");
    assert_eq!(core.debris().len(), 256);
    assert_eq!(core.grid().count_material(Material::Wood), 256);
    assert_eq!(
        core.grid().count_material(Material::Sand),
        sand_before - 256
    );

    // every ejected particle spawned above the box top
    let top = core
        .bridge()
        .spawn_top(1, core.physics(), core.config().pixels_per_meter)
        .expect("live body");
    for debris in core.debris().render_data(core.physics()) {
        assert!(
            debris.position.y <= top + 0.02,
            "debris at y={} below box top {}",
            debris.position.y,
            top
        );
    }

    // the world keeps running without losing the stamped body
    for _ in 0..60 {
        core.step();
    }
    assert!(core.grid().count_material(Material::Wood) > 0);
}

#[test]
fn injected_debris_all_settle_or_age_out() {
    let config = SimConfig {
        debris_radius_px: 1.0,
        ..test_config()
    };
    let mut grid = grainfall::Grid::new(2, 2);
    let mut physics = PhysicsWorld::new(&config);
    let mut pool = DebrisPool::new();
    let worker_pool = WorkerPool::with_threads(2);
    let mut mesh = MeshExtractor::new(2, 2);
    let mut rng = SmallRng::seed_from_u64(42);

    // stone floor across the world
    for x in 1..127 {
        grid.set_cell(x, 100, Material::Stone);
    }

    for i in 0..100 {
        pool.spawn(
            &mut physics,
            &config,
            14 + i,
            90.0 / 32.0,
            Material::Sand,
            &mut rng,
        );
    }
    assert_eq!(pool.len(), 100);

    let mut settled_total = 0;
    for _ in 0..600 {
        // keep the terrain chains in sync so settled cells support later
        // arrivals, as the full pipeline would
        let chains = mesh.extract(&mut grid, &worker_pool, &config);
        physics.update_terrain(&chains);
        physics.step();
        settled_total += pool.update(&mut grid, &mut physics, &config);
    }

    assert_eq!(pool.len(), 0, "no debris may stay live past its max age");
    assert_eq!(grid.count_material(Material::Sand), settled_total);
    assert!(
        settled_total >= 30,
        "only {} of 100 debris settled",
        settled_total
    );
}

#[test]
fn border_stays_stone_under_load() {
    let mut core = SimCore::new(2, 2, test_config());
    core.paint_disc(64, 30, 15, Material::Sand);
    core.paint_disc(64, 70, 15, Material::Water);
    core.spawn_box(2.0, 1.0, 0.5, 0.5, Material::Wood);

    for step in 0..120 {
        core.step();
        if step % 20 != 0 {
            continue;
        }
        let grid = core.grid();
        let (w, h) = (grid.width() as i32, grid.height() as i32);
        for x in 0..w {
            assert_eq!(grid.cell(x, 0).material, Material::Stone);
            assert_eq!(grid.cell(x, h - 1).material, Material::Stone);
        }
        for y in 0..h {
            assert_eq!(grid.cell(0, y).material, Material::Stone);
            assert_eq!(grid.cell(w - 1, y).material, Material::Stone);
        }
    }
}

#[test]
fn seeded_runs_replay_bit_identically() {
    let run = || {
        let mut core = SimCore::new(2, 2, test_config());
        core.paint_disc(50, 20, 10, Material::Sand);
        core.paint_disc(90, 40, 8, Material::Water);
        core.spawn_box(2.0, 1.0, 0.5, 0.5, Material::Wood);

        let mut checkpoints = Vec::new();
        for step in 1..=100u32 {
            core.step();
            if step % 50 == 0 {
                let grid = core.grid();
                let mut cells = Vec::new();
                for y in 0..grid.height() as i32 {
                    for x in 0..grid.width() as i32 {
                        let cell = grid.cell(x, y);
                        cells.push((cell.material, cell.body));
                    }
                }
                checkpoints.push(cells);
            }
        }
        checkpoints
    };
    assert_eq!(run(), run());
}

#[test]
fn paint_and_erase_round_trip() {
    let mut core = SimCore::new(2, 2, test_config());
    core.paint_disc(64, 64, 12, Material::Stone);
    assert!(core.grid().count_material(Material::Stone) > 0);

    core.paint_disc(64, 64, 12, Material::Air);
    // only the border ring remains
    let border = 2 * core.grid().width() + 2 * core.grid().height() - 4;
    assert_eq!(core.grid().count_non_air(), border);
}
