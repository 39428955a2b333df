use std::fmt;
use std::io;
use std::io::Write;

use crate::instructions::instructions::{CycleType, Tag};
use crate::report::events::EventKind;

// `None` for a stage the instruction has not reached yet
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct InstrStamps {
    pub fetch: Option<CycleType>,
    pub dispatch: Option<CycleType>,
    pub fire: Option<CycleType>,
    pub complete: Option<CycleType>,
    pub broadcast: Option<CycleType>,
    pub retire: Option<CycleType>,
}

impl InstrStamps {
    fn set(&mut self, kind: EventKind, cycle: CycleType) {
        let stamp = match kind {
            EventKind::Fetched => &mut self.fetch,
            EventKind::Dispatched => &mut self.dispatch,
            EventKind::Scheduled => &mut self.fire,
            EventKind::Executed => &mut self.complete,
            EventKind::Broadcast => &mut self.broadcast,
            EventKind::Retired => &mut self.retire,
        };
        debug_assert!(stamp.is_none(), "stage {:?} stamped twice", kind);
        *stamp = Some(cycle);
    }
}

#[derive(Clone, Default, Debug)]
pub struct StampTable {
    stamps: Vec<InstrStamps>,
}

impl StampTable {
    pub fn new() -> StampTable {
        StampTable::default()
    }

    pub(crate) fn record(&mut self, kind: EventKind, tag: Tag, cycle: CycleType) {
        debug_assert!(tag > 0);
        let index = (tag - 1) as usize;
        if index >= self.stamps.len() {
            self.stamps.resize(index + 1, InstrStamps::default());
        }
        self.stamps[index].set(kind, cycle);
    }

    #[cfg(test)]
    pub fn get(&self, tag: Tag) -> Option<&InstrStamps> {
        if tag == 0 {
            return None;
        }
        self.stamps.get((tag - 1) as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item=(Tag, &InstrStamps)> {
        self.stamps.iter().enumerate().map(|(index, stamps)| (index as Tag + 1, stamps))
    }

    pub fn write_table<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "INST\tFETCH\tDISP\tSCHED\tEXEC\tSTATE")?;
        for (tag, stamps) in self.iter() {
            write!(writer, "{}", tag)?;
            for stamp in [stamps.fetch, stamps.dispatch, stamps.fire, stamps.complete, stamps.retire] {
                match stamp {
                    Some(cycle) => write!(writer, "\t{}", cycle)?,
                    None => write!(writer, "\t-")?,
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct SimStats {
    pub cycle_count: u64,
    pub retired_cnt: u64,
    pub fired_cnt: u64,
    pub avg_inst_retired: f64,
    pub avg_inst_fired: f64,
    pub avg_disp_size: f64,
    pub max_disp_size: u64,
}

impl fmt::Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processor stats:")?;
        writeln!(f, "Total instructions: {}", self.retired_cnt)?;
        writeln!(f, "Avg Dispatch queue size: {:.6}", self.avg_disp_size)?;
        writeln!(f, "Maximum Dispatch queue size: {}", self.max_disp_size)?;
        writeln!(f, "Avg inst fired per cycle: {:.6}", self.avg_inst_fired)?;
        writeln!(f, "Avg inst retired per cycle: {:.6}", self.avg_inst_retired)?;
        write!(f, "Total run time (cycles): {}", self.cycle_count)
    }
}
