//! Switchsim - Switching Converter Circuit Simulator
//!
//! Runs a netlist for a fixed number of steps and prints probe samples,
//! one line per step.
//!
//! # Usage
//!
//! ```bash
//! switchsim buck.net --dt 100n --steps 20000 --probe 'v(3)' --probe 'i(L1)'
//! RUST_LOG=switchsim_core=debug switchsim flyback.net --sine V1:325:50
//! ```

use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use switchsim_core::{
    circuit::Circuit,
    error::Result,
    netlist,
    probe::{run_trace, Probe, SineDrive, TraceWriter},
    Simulator, SimulatorConfig, DEFAULT_TIME_STEP,
};

/// Switching converter circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the netlist file
    #[arg(value_name = "NETLIST")]
    netlist: PathBuf,

    /// Time step in seconds (unit suffixes allowed)
    #[arg(long, default_value_t = DEFAULT_TIME_STEP, value_parser = parse_seconds)]
    dt: f64,

    /// Number of steps to simulate
    #[arg(long, default_value_t = 1000)]
    steps: u64,

    /// Drive a voltage source with a sine, NAME:AMPLITUDE:FREQUENCY
    #[arg(long, value_name = "NAME:AMPL:FREQ")]
    sine: Vec<SineDrive>,

    /// Quantity to print after every step: v(N), v(N,M), i(NAME), im(NAME).
    /// Defaults to every node voltage.
    #[arg(long, value_name = "EXPR")]
    probe: Vec<Probe>,

    /// Re-solves allowed per step before forcing diode states
    #[arg(long)]
    max_iterations: Option<usize>,
}

fn parse_seconds(text: &str) -> std::result::Result<f64, String> {
    netlist::parse_value(text).ok_or_else(|| format!("invalid time '{}'", text))
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let netlist = netlist::parse_file(&args.netlist)?;
    let circuit = Circuit::from_netlist(&netlist)?;

    let mut config = SimulatorConfig::new();
    if let Some(max) = args.max_iterations {
        config = config.with_max_iterations(max);
    }
    let mut simulator = Simulator::with_config(circuit, args.dt, config)?;

    let probes = if args.probe.is_empty() {
        (1..=simulator.circuit().node_count)
            .map(Probe::NodeVoltage)
            .collect()
    } else {
        args.probe
    };

    let mut writer = TraceWriter::new(io::BufWriter::new(io::stdout().lock()));
    run_trace(&mut simulator, &args.sine, &probes, args.steps, &mut writer)
}
