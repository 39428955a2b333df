use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::exit;
use std::rc::Rc;

use log::{error, warn};
use structopt::StructOpt;

use crate::cpu::{CPU, CPUConfig, load_cpu_config};
use crate::instructions::instructions::ProgramSource;
use crate::loader::loader::{load, LoadError};
use crate::report::events::{LogSink, TraceSink, WriterSink};

mod cpu;
mod loader;
mod frontend;
mod backend;
mod instructions;
mod report;


#[derive(StructOpt, Debug)]
#[structopt(name = "procsim", about = "Tomasulo out-of-order pipeline simulator")]
struct Opt {
    /// Path of the instruction trace to run
    #[structopt(short, long, parse(from_os_str))]
    input: PathBuf,

    /// Sets a custom config file; built-in defaults are used when absent
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Number of instructions fetched per cycle
    #[structopt(short = "f", long)]
    fetch: Option<u16>,

    /// Number of result buses
    #[structopt(short = "r", long)]
    result_buses: Option<u16>,

    /// Number of k0 functional units
    #[structopt(short = "j", long)]
    k0: Option<u16>,

    /// Number of k1 functional units
    #[structopt(short = "k", long)]
    k1: Option<u16>,

    /// Number of k2 functional units
    #[structopt(short = "l", long)]
    k2: Option<u16>,

    /// Writes the per cycle event log to this file
    #[structopt(long, parse(from_os_str))]
    log: Option<PathBuf>,

    /// Prints the per instruction stage table after the run
    #[structopt(long)]
    stamps: bool,

    /// Gives up after this many cycles
    #[structopt(long)]
    max_cycles: Option<u64>,
}

fn build_config(opt: &Opt) -> Result<CPUConfig, String> {
    let mut cpu_config = match &opt.config {
        Some(path) => {
            let path = path.to_string_lossy();
            load_cpu_config(&path).map_err(|err| format!("Failed to load {}. Cause: {}", path, err))?
        }
        None => CPUConfig::default(),
    };

    if let Some(fetch) = opt.fetch {
        cpu_config.fetch_n_wide = fetch;
    }
    if let Some(result_buses) = opt.result_buses {
        cpu_config.result_bus_count = result_buses;
    }
    if let Some(k0) = opt.k0 {
        cpu_config.k0_fu_count = k0;
    }
    if let Some(k1) = opt.k1 {
        cpu_config.k1_fu_count = k1;
    }
    if let Some(k2) = opt.k2 {
        cpu_config.k2_fu_count = k2;
    }

    cpu_config.validate().map_err(|err| format!("Invalid configuration: {}", err))?;
    Ok(cpu_config)
}

fn build_sink(opt: &Opt, cpu_config: &CPUConfig) -> Result<Box<dyn TraceSink>, io::Error> {
    let mut sinks: Vec<Box<dyn TraceSink>> = vec![Box::new(LogSink::new(cpu_config.trace.clone()))];
    if let Some(path) = &opt.log {
        let file = File::create(path)?;
        sinks.push(Box::new(WriterSink::new(BufWriter::new(file))?));
    }
    Ok(Box::new(sinks))
}

fn main() {
    env_logger::init();

    let opt = Opt::from_args();

    let cpu_config = match build_config(&opt) {
        Ok(config) => config,
        Err(msg) => {
            println!("{}", msg);
            exit(1);
        }
    };

    let path = opt.input.to_string_lossy();
    println!("Loading {}", path);
    let program = match load(&cpu_config, &path) {
        Ok(p) => Rc::new(p),
        Err(err) => {
            println!("Loading trace '{}' failed.", path);
            match err {
                LoadError::AnalysisError(msg_vec) => {
                    for msg in msg_vec {
                        println!("{}", msg);
                    }
                }
                other => println!("{}", other),
            }
            exit(1);
        }
    };

    if program.is_empty() {
        warn!("Trace '{}' contains no instructions", path);
    }

    let sink = match build_sink(&opt, &cpu_config) {
        Ok(sink) => sink,
        Err(err) => {
            println!("Failed to open event log. Cause: {}", err);
            exit(1);
        }
    };

    println!("Processor settings");
    println!("R: {}", cpu_config.result_bus_count);
    println!("k0: {}", cpu_config.k0_fu_count);
    println!("k1: {}", cpu_config.k1_fu_count);
    println!("k2: {}", cpu_config.k2_fu_count);
    println!("F: {}", cpu_config.fetch_n_wide);
    println!();

    let mut cpu = CPU::new(&cpu_config, Box::new(ProgramSource::new(&program)), sink);
    let stats = cpu.run(opt.max_cycles);
    if !cpu.is_done() {
        error!("Simulation did not finish within {} cycles", cpu.cycle());
        println!("Simulation did not finish within {} cycles; is a functional unit class empty?", cpu.cycle());
        exit(2);
    }

    if stats.retired_cnt != program.len() as u64 {
        warn!("{} instructions loaded but {} retired", program.len(), stats.retired_cnt);
    }

    if opt.stamps {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(err) = cpu.stamps().write_table(&mut out) {
            error!("Failed to write the stage table: {}", err);
        }
        println!();
    }

    println!("{}", stats);
}
