//! Out-of-order pipeline simulator CLI.
//!
//! Assembles a program, runs it to completion on the out-of-order engine,
//! and prints the final summary: cycle count, flush count, instructions
//! retired, IPC. `--debug` additionally prints a per-cycle state dump
//! (optionally single-stepped with `--step`).

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::{fs, process};

use clap::Parser;
use supersim_core::common::error::AssemblyError;
use supersim_core::isa::assemble;
use supersim_core::sim::observer::{MachineSnapshot, NullObserver, Observer};
use supersim_core::sim::simulator::RunOutcome;
use supersim_core::{Config, Simulator};

/// A cycle-level simulator of a superscalar out-of-order pipeline.
#[derive(Parser, Debug)]
#[command(name = "supersim", author, version, about)]
struct Cli {
    /// Assembly source file to run.
    program: String,

    /// Enable a per-cycle human-readable state dump.
    #[arg(long)]
    debug: bool,

    /// Prompt for Enter before each cycle (implies --debug).
    #[arg(long)]
    step: bool,

    /// Optional TOML configuration file overriding engine defaults.
    #[arg(long)]
    config: Option<String>,

    /// Safety bound on cycles, guarding against non-terminating programs.
    #[arg(long, default_value_t = 1_000_000)]
    max_cycles: u64,
}

/// Prints every cycle's [`MachineSnapshot`] to stdout and, in `--step` mode,
/// blocks on stdin between cycles.
struct DebugObserver {
    step: bool,
    stdin: io::Stdin,
}

impl Observer for DebugObserver {
    fn on_cycle(&mut self, snapshot: &MachineSnapshot) {
        println!("{}", format_snapshot(snapshot));
        if self.step {
            print!("  [Enter to continue] ");
            io::stdout().flush().ok();
            let mut line = String::new();
            self.stdin.lock().read_line(&mut line).ok();
        }
    }
}

/// Renders a [`MachineSnapshot`] the same way whether it came from the
/// per-cycle debug dump or from a fatal [`supersim_core::common::error::IllegalState`].
fn format_snapshot(snapshot: &MachineSnapshot) -> String {
    let mut out = format!(
        "cycle {:<6} pc={:<4} rob={}/{} mob={}/{}{}{}",
        snapshot.cycle,
        snapshot.pc,
        snapshot.rob_occupancy,
        snapshot.rob_capacity,
        snapshot.mob_occupancy,
        snapshot.mob_capacity,
        if snapshot.flushed { "  FLUSH" } else { "" },
        if snapshot.halted { "  HALT" } else { "" },
    );
    if let Some(entry) = &snapshot.retired {
        out.push_str(&format!(
            "\n  retired {:<6} pc={} dest={:?} result={}",
            entry.inst.opcode.mnemonic(),
            entry.pc,
            entry.dest,
            entry.result
        ));
    }
    out
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    tracing::info!(program = %cli.program, max_cycles = cli.max_cycles, "starting run");

    let source = fs::read_to_string(&cli.program).unwrap_or_else(|e| {
        eprintln!("error: could not read {}: {e}", cli.program);
        process::exit(1);
    });

    let config = match &cli.config {
        Some(path) => {
            tracing::debug!(path = %path, "loading config override");
            let text = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("error: could not read config {path}: {e}");
                process::exit(1);
            });
            Config::from_toml(&text).unwrap_or_else(|e| {
                eprintln!("error: invalid config {path}: {e}");
                process::exit(1);
            })
        }
        None => Config::default(),
    };

    let program = match assemble(&source) {
        Ok(program) => program,
        Err(err) => {
            report_assembly_error(&err);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(instructions = program.instructions.len(), "assembled program");

    let mut sim = Simulator::new(program, &config);
    let debug = cli.debug || cli.step;

    let run_result = if debug {
        let mut observer = DebugObserver {
            step: cli.step,
            stdin: io::stdin(),
        };
        sim.run(cli.max_cycles, &mut observer)
    } else {
        let mut observer = NullObserver;
        sim.run(cli.max_cycles, &mut observer)
    };

    match run_result {
        Ok(RunOutcome::Halted) => {
            sim.stats.print();
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::CycleBudgetExhausted) => {
            eprintln!(
                "warning: reached --max-cycles={} without HALT retiring",
                cli.max_cycles
            );
            sim.stats.print();
            ExitCode::from(2)
        }
        Err(illegal) => {
            tracing::error!(message = %illegal, "illegal runtime state");
            eprintln!("fatal: {illegal}");
            match &illegal.snapshot {
                Some(snapshot) => eprintln!("{}", format_snapshot(snapshot)),
                None => eprintln!(
                    "cycle {} pc={} registers={:?}",
                    sim.stats.cycles, sim.cpu.pc, sim.cpu.registers
                ),
            }
            ExitCode::FAILURE
        }
    }
}

fn report_assembly_error(err: &AssemblyError) {
    eprintln!("assembly error: {err}");
}
