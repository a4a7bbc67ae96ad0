use anyhow::Result;
use clap::Parser;
use log::info;

use tile_traffic::simulation::{fixtures, SimulationConfig, TilemapConfig, World};

#[derive(Parser)]
#[command(name = "tile_traffic")]
#[command(about = "Headless tile-based city traffic simulation")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "1000")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.05")]
    delta: f32,

    /// Seed for generation and spawning
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of cars to spawn at the start
    #[arg(long, default_value = "30")]
    cars: usize,

    /// Generate a random map instead of using the built-in city
    #[arg(long)]
    generate: bool,

    /// Map width in cells when generating
    #[arg(long, default_value = "16")]
    width: u32,

    /// Map height in cells when generating
    #[arg(long, default_value = "12")]
    height: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn,tile_traffic=info")).init();
    let cli = Cli::parse();
    run_headless(&cli)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(cli: &Cli) -> Result<()> {
    println!("Running traffic simulation in headless mode...");
    println!("Ticks: {}, Delta: {}s, Seed: {}", cli.ticks, cli.delta, cli.seed);
    println!();

    let config = SimulationConfig::with_seed(cli.seed);
    let mut world = if cli.generate {
        let mut world = World::generate(TilemapConfig::city(cli.width, cli.height, cli.seed), config);
        while world.is_generating() {
            world.update_tilemap(cli.delta)?;
        }
        world
    } else {
        fixtures::large_world(config)?
    };

    let spawned = world.spawn_random_cars(cli.cars);
    info!("spawned {} cars", spawned);

    println!("Initial state:");
    world.print_summary();
    world.draw_map();

    // Report once per simulated second
    let ticks_per_second = (1.0 / cli.delta).ceil().max(1.0) as u32;
    let mut tick = 0;
    while tick < cli.ticks {
        let ticks_to_run = ticks_per_second.min(cli.ticks - tick);
        for _ in 0..ticks_to_run {
            tick += 1;
            world.tick(cli.delta)?;
        }

        println!("--- After tick {} ({:.1}s simulated time) ---", tick, world.time);
        println!(
            "Active cars: {}, arrived: {}",
            world.cars().len(),
            world.stats().arrived
        );
    }

    println!();
    println!("=== SIMULATION COMPLETE ===");
    world.print_summary();
    world.draw_map();
    Ok(())
}
