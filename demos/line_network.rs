//! Lays a power line between a generator and a machine and prints how the energy moves.
//!
//! ```text
//! RUST_LOG=conduit_lib=debug cargo run --example line_network -- --length 6 --ticks 12
//! ```

use std::sync::Arc;

use clap::Parser;
use conduit_lib::conduits::host::{EnergyCell, HostBlock, InMemoryHost};
use conduit_lib::conduits::{ConduitTypeRegistry, ConduitWorld};
use conduit_lib::{ConduitConfig, Position};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Simulates a straight power conduit line")]
struct Args {
    /// Number of conduits between the generator and the machine.
    #[arg(long, default_value_t = 4)]
    length: i32,

    /// Simulation steps to run.
    #[arg(long, default_value_t = 10)]
    ticks: u32,

    /// Steps between two transfers of a network.
    #[arg(long, default_value_t = 1)]
    tick_rate: u64,

    /// Power tier to lay down.
    #[arg(long, default_value = "power1")]
    conduit: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = ConduitConfig {
        tick_rate: args.tick_rate,
        ..ConduitConfig::default()
    };
    let registry = Arc::new(ConduitTypeRegistry::ender_defaults(&config)?);
    let conduit = registry.require(&args.conduit)?;

    let generator_at = Position::new(-1, 0, 0);
    let machine_at = Position::new(args.length, 0, 0);
    let mut host = InMemoryHost::new();
    // Generators only give and machines only take.
    host.insert(
        generator_at,
        HostBlock::Energy(EnergyCell::filled(100_000, 100_000).with_limits(0, u64::MAX)),
    );
    host.insert(
        machine_at,
        HostBlock::Energy(EnergyCell::new(50_000).with_limits(u64::MAX, 0)),
    );

    let mut world = ConduitWorld::new(registry, config, host);
    for x in 0..args.length {
        world.add_type(Position::new(x, 0, 0), conduit, None)?;
    }
    println!(
        "{} conduits in {} network(s)",
        args.length,
        world.graphs().len()
    );

    for _ in 0..args.ticks {
        let transfers = world.tick();
        let generator = world.host().energy(generator_at).map_or(0, EnergyCell::stored);
        let machine = world.host().energy(machine_at).map_or(0, EnergyCell::stored);
        println!(
            "tick {:>3}: {transfers} transfer(s), generator {generator:>6}, machine {machine:>6}",
            world.ticks()
        );
    }
    Ok(())
}
