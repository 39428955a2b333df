use std::error::Error;
use std::fs::File;

use log::{debug, info, warn};
use serde::Deserialize;

use crate::backend::backend::Backend;
use crate::frontend::frontend::Frontend;
use crate::instructions::instructions::{CycleType, InstrQueue, InstrSource, mnemonic, OpClass, Tag};
use crate::report::events::{EventKind, TraceEvent, TraceSink};
use crate::report::stats::{SimStats, StampTable};

#[derive(Default, Debug, Clone, PartialEq)]
pub(crate) struct PerfCounters {
    pub fetch_cnt: u64,
    pub dispatch_cnt: u64,
    pub fire_cnt: u64,
    pub execute_cnt: u64,
    pub broadcast_cnt: u64,
    pub retired_cnt: u64,
    pub cycle_cnt: u64,
    pub disp_size_total: u64,
    pub disp_size_max: u64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, kind: EventKind, count: usize) {
        let count = count as u64;
        match kind {
            EventKind::Fetched => self.fetch_cnt += count,
            EventKind::Dispatched => self.dispatch_cnt += count,
            EventKind::Scheduled => self.fire_cnt += count,
            EventKind::Executed => self.execute_cnt += count,
            EventKind::Broadcast => self.broadcast_cnt += count,
            EventKind::Retired => self.retired_cnt += count,
        }
    }
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Trace {
    pub fetch: bool,
    pub dispatch: bool,
    pub schedule: bool,
    pub execute: bool,
    pub broadcast: bool,
    pub retire: bool,
    pub cycle: bool,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct CPUConfig {
    // the number of instructions fetched per clock cycle.
    pub fetch_n_wide: u16,
    // the number of results that can be broadcast per clock cycle.
    pub result_bus_count: u16,
    // the number of functional units per opcode class.
    pub k0_fu_count: u16,
    pub k1_fu_count: u16,
    pub k2_fu_count: u16,
    // the number of architectural registers
    pub register_count: u16,
    // which pipeline events should be logged
    pub trace: Trace,
}

impl Default for CPUConfig {
    fn default() -> Self {
        CPUConfig {
            fetch_n_wide: 4,
            result_bus_count: 8,
            k0_fu_count: 1,
            k1_fu_count: 2,
            k2_fu_count: 3,
            register_count: 128,
            trace: Trace::default(),
        }
    }
}

impl CPUConfig {
    pub(crate) fn fu_count(&self, op_class: OpClass) -> u16 {
        match op_class {
            OpClass::A => self.k0_fu_count,
            OpClass::B => self.k1_fu_count,
            OpClass::C => self.k2_fu_count,
        }
    }

    // two reservation stations per functional unit
    pub(crate) fn rs_capacity(&self) -> u16 {
        2 * OpClass::ALL.iter().map(|&op_class| self.fu_count(op_class)).sum::<u16>()
    }

    // A pool without units is allowed; instructions of that class simply
    // never execute. Without fetch or result buses nothing could ever retire.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.fetch_n_wide == 0 {
            return Err("fetch_n_wide must be at least 1".to_string());
        }
        if self.result_bus_count == 0 {
            return Err("result_bus_count must be at least 1".to_string());
        }
        if self.register_count == 0 {
            return Err("register_count must be at least 1".to_string());
        }
        let fu_total = self.k0_fu_count as u32 + self.k1_fu_count as u32 + self.k2_fu_count as u32;
        if 2 * fu_total > u16::MAX as u32 {
            return Err(format!("too many functional units ({})", fu_total));
        }
        Ok(())
    }
}

pub(crate) fn load_cpu_config(file_path: &str) -> Result<CPUConfig, Box<dyn Error>> {
    let file = File::open(file_path)?;
    let config: CPUConfig = serde_yaml::from_reader(file)?;
    config.validate()?;
    Ok(config)
}

/// The simulated processor. It owns every pipeline structure.
pub(crate) struct CPU {
    frontend: Frontend,
    instr_queue: InstrQueue,
    backend: Backend,
    perf_counters: PerfCounters,
    stamps: StampTable,
    sink: Box<dyn TraceSink>,
    trace: Trace,
    cycle: CycleType,
}

impl CPU {
    pub(crate) fn new(cpu_config: &CPUConfig,
                      source: Box<dyn InstrSource>,
                      sink: Box<dyn TraceSink>) -> CPU {
        CPU {
            frontend: Frontend::new(cpu_config, source),
            instr_queue: InstrQueue::new(),
            backend: Backend::new(cpu_config),
            perf_counters: PerfCounters::new(),
            stamps: StampTable::new(),
            sink,
            trace: cpu_config.trace.clone(),
            cycle: 0,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.frontend.exhausted && self.instr_queue.is_empty() && self.backend.is_empty()
    }

    // Runs until the machine drains or, if given, until `max_cycles` have
    // passed. The caller checks `is_done` to tell the two apart.
    pub(crate) fn run(&mut self, max_cycles: Option<CycleType>) -> SimStats {
        info!("Simulation started: {} reservation stations", self.backend.rs_table.capacity);

        while !self.is_done() {
            if max_cycles.map_or(false, |limit| self.cycle >= limit) {
                warn!("Simulation stopped after {} cycles with {} instructions in flight",
                      self.cycle, self.backend.rs_table.busy_count() as usize + self.instr_queue.size());
                break;
            }
            self.do_cycle();
        }
        self.sink.finish();

        let stats = self.stats();
        info!("Simulation ended after {} cycles, {} instructions retired", stats.cycle_count, stats.retired_cnt);
        for op_class in OpClass::ALL {
            let pool = self.backend.eu_table.get(op_class);
            info!("{} units: {} of {} unit cycles busy",
                  mnemonic(op_class), pool.utilisation, pool.capacity as u64 * stats.cycle_count);
        }
        stats
    }

    /// Advances the machine by one clock cycle. The phases run in a fixed
    /// order: retire, execute, broadcast, fire, wakeup, dispatch, fetch.
    /// Results broadcast in this cycle are visible to dispatch in the same
    /// cycle but to fire only from the next cycle on.
    pub(crate) fn do_cycle(&mut self) {
        self.cycle += 1;
        self.perf_counters.cycle_cnt += 1;

        let retired = self.backend.cycle_retire(self.cycle);
        self.record(EventKind::Retired, &retired);

        let executed = self.backend.cycle_execute(self.cycle);
        self.record(EventKind::Executed, &executed);

        let broadcast = self.backend.cycle_broadcast(self.cycle);
        debug_assert!(broadcast.len() <= self.backend.cdb.capacity as usize);
        self.record(EventKind::Broadcast, &broadcast);

        let fired = self.backend.cycle_fire(self.cycle);
        debug_assert!(self.backend.eu_table.iter().all(|pool| pool.busy() <= pool.capacity));
        self.record(EventKind::Scheduled, &fired);

        self.backend.cycle_wakeup();

        let dispatched = self.backend.cycle_dispatch(self.cycle, &mut self.instr_queue);
        self.record(EventKind::Dispatched, &dispatched);

        let fetched = self.frontend.do_cycle(&mut self.instr_queue);
        self.record(EventKind::Fetched, &fetched);

        let disp_size = self.instr_queue.size() as u64;
        self.perf_counters.disp_size_total += disp_size;
        self.perf_counters.disp_size_max = self.perf_counters.disp_size_max.max(disp_size);

        if self.trace.cycle {
            let perf_counters = &self.perf_counters;
            debug!("[Cycles:{}][Fetched={}][Dispatched={}][Fired={}][Executed={}][Broadcast={}][Retired={}][DispQ={}][RS={}/{}][IPC={:.2}]",
                   perf_counters.cycle_cnt,
                   perf_counters.fetch_cnt,
                   perf_counters.dispatch_cnt,
                   perf_counters.fire_cnt,
                   perf_counters.execute_cnt,
                   perf_counters.broadcast_cnt,
                   perf_counters.retired_cnt,
                   disp_size,
                   self.backend.rs_table.busy_count(),
                   self.backend.rs_table.capacity,
                   perf_counters.retired_cnt as f32 / perf_counters.cycle_cnt as f32
            );
            self.backend.dump();
        }
    }

    fn record(&mut self, kind: EventKind, tags: &[Tag]) {
        for &tag in tags {
            self.stamps.record(kind, tag, self.cycle);
            self.sink.event(&TraceEvent { cycle: self.cycle, kind, tag });
        }
        self.perf_counters.add(kind, tags.len());
    }

    pub(crate) fn cycle(&self) -> CycleType {
        self.cycle
    }

    pub(crate) fn stamps(&self) -> &StampTable {
        &self.stamps
    }

    #[cfg(test)]
    pub(crate) fn perf_counters(&self) -> &PerfCounters {
        &self.perf_counters
    }

    pub(crate) fn stats(&self) -> SimStats {
        let perf_counters = &self.perf_counters;
        let per_cycle = |cnt: u64| {
            if perf_counters.cycle_cnt == 0 {
                0.0
            } else {
                cnt as f64 / perf_counters.cycle_cnt as f64
            }
        };

        SimStats {
            cycle_count: perf_counters.cycle_cnt,
            retired_cnt: perf_counters.retired_cnt,
            fired_cnt: perf_counters.fire_cnt,
            avg_inst_retired: per_cycle(perf_counters.retired_cnt),
            avg_inst_fired: per_cycle(perf_counters.fire_cnt),
            avg_disp_size: per_cycle(perf_counters.disp_size_total),
            max_disp_size: perf_counters.disp_size_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cpu_config = CPUConfig::default();
        assert_eq!(cpu_config.fetch_n_wide, 4);
        assert_eq!(cpu_config.result_bus_count, 8);
        assert_eq!(cpu_config.rs_capacity(), 12);
        assert!(cpu_config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "fetch_n_wide: 2\nk2_fu_count: 0\ntrace:\n  retire: true\n";
        let cpu_config: CPUConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cpu_config.fetch_n_wide, 2);
        assert_eq!(cpu_config.k2_fu_count, 0);
        assert_eq!(cpu_config.k1_fu_count, 2);
        assert_eq!(cpu_config.rs_capacity(), 6);
        assert!(cpu_config.trace.retire);
        assert!(!cpu_config.trace.fetch);
        // an empty pool is a legal configuration
        assert!(cpu_config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_fetch_and_buses() {
        let mut cpu_config = CPUConfig::default();
        cpu_config.fetch_n_wide = 0;
        assert!(cpu_config.validate().is_err());

        let mut cpu_config = CPUConfig::default();
        cpu_config.result_bus_count = 0;
        assert!(cpu_config.validate().is_err());
    }

    #[test]
    fn test_load_missing_config() {
        assert!(load_cpu_config("/nonexistent/cpu.yaml").is_err());
    }
}
