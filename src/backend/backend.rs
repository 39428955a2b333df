use std::cmp::min;

use log::trace;

use crate::backend::cdb::{CDB, CDBRequest};
use crate::backend::execution_unit::{EUTable, EXECUTE_LATENCY};
use crate::backend::register_status::RegisterStatusTable;
use crate::backend::reservation_station::RSTable;
use crate::cpu::CPUConfig;
use crate::instructions::instructions::{CycleType, InstrQueue, Tag};

/// The out-of-order part of the pipeline: reservation stations, register
/// status, functional units and result buses. Each `cycle_*` method is one
/// phase of a clock cycle and returns the tags it moved, oldest first; the
/// `CPU` decides the phase order.
pub(crate) struct Backend {
    pub(crate) rs_table: RSTable,
    pub(crate) rat: RegisterStatusTable,
    pub(crate) eu_table: EUTable,
    pub(crate) cdb: CDB,
}

impl Backend {
    pub(crate) fn new(cpu_config: &CPUConfig) -> Backend {
        Backend {
            rs_table: RSTable::new(cpu_config.rs_capacity()),
            rat: RegisterStatusTable::new(cpu_config.register_count),
            eu_table: EUTable::new(cpu_config),
            cdb: CDB::new(cpu_config.result_bus_count),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.rs_table.has_busy()
    }

    // Frees every slot whose result went out on an earlier cycle. A slot is
    // never freed in the cycle of its own broadcast.
    pub(crate) fn cycle_retire(&mut self, cycle: CycleType) -> Vec<Tag> {
        let retired = self.rs_table.select_by_tag(|rs| rs.broadcast && rs.broadcast_cycle < cycle);

        let mut tags = Vec::with_capacity(retired.len());
        for rs_index in retired {
            let rs = self.rs_table.get(rs_index);
            trace!("Retiring {}", rs);
            tags.push(rs.tag());
            self.rs_table.deallocate(rs_index);
        }
        tags
    }

    // Completes every fired instruction whose execution latency has passed.
    pub(crate) fn cycle_execute(&mut self, cycle: CycleType) -> Vec<Tag> {
        self.eu_table.cycle_utilisation();

        let completed = self.rs_table.select_by_tag(|rs| {
            rs.fired && !rs.completed && rs.fire_cycle + EXECUTE_LATENCY <= cycle
        });

        let mut tags = Vec::with_capacity(completed.len());
        for rs_index in completed {
            let rs = self.rs_table.get_mut(rs_index);
            rs.completed = true;
            rs.complete_cycle = cycle;
            tags.push(rs.tag());
        }
        tags
    }

    // Hands the result buses to the completed instructions. A winner gives
    // back its functional unit and, if it is still the newest writer of its
    // destination, makes that register readable for dispatch.
    pub(crate) fn cycle_broadcast(&mut self, cycle: CycleType) -> Vec<Tag> {
        let requests = self.rs_table.select_by_tag(|rs| rs.completed && !rs.broadcast)
            .into_iter()
            .map(|rs_index| {
                let rs = self.rs_table.get(rs_index);
                CDBRequest { complete_cycle: rs.complete_cycle, tag: rs.tag(), rs_index }
            })
            .collect();

        let granted = self.cdb.arbitrate(requests);
        for req in &granted {
            let rs = self.rs_table.get_mut(req.rs_index);
            rs.broadcast = true;
            rs.broadcast_cycle = cycle;

            if let Some(instr) = rs.instr {
                self.eu_table.deallocate(instr.op_class);
                if let Some(sink) = instr.sink() {
                    self.rat.complete(sink, instr.tag);
                }
            }
        }

        self.cdb.broadcasts().to_vec()
    }

    // Sends ready instructions to their functional units, oldest first. An
    // instruction whose pool is exhausted stays behind; younger instructions
    // of other classes may still go.
    pub(crate) fn cycle_fire(&mut self, cycle: CycleType) -> Vec<Tag> {
        let candidates = self.rs_table.select_by_tag(|rs| !rs.fired && rs.is_ready());

        let mut tags = Vec::with_capacity(candidates.len());
        for rs_index in candidates {
            let instr = match self.rs_table.get(rs_index).instr {
                Some(instr) => instr,
                None => continue,
            };

            if !self.eu_table.allocate(instr.op_class) {
                continue;
            }

            let rs = self.rs_table.get_mut(rs_index);
            rs.fired = true;
            rs.fire_cycle = cycle;
            tags.push(instr.tag);
        }
        tags
    }

    // Applies this cycle's broadcasts to the waiting instructions. Runs after
    // `cycle_fire`, so a woken operand is first usable on the next cycle.
    pub(crate) fn cycle_wakeup(&mut self) -> usize {
        let broadcasts = self.cdb.broadcasts();
        let mut woken = 0;
        for rs in self.rs_table.iter_busy_mut() {
            if rs.fired {
                continue;
            }

            for &tag in broadcasts {
                if rs.wakeup(tag) {
                    woken += 1;
                }
            }
        }
        woken
    }

    // Moves instructions from the dispatch queue into free reservation
    // stations in program order.
    pub(crate) fn cycle_dispatch(&mut self, cycle: CycleType, instr_queue: &mut InstrQueue) -> Vec<Tag> {
        let admit = min(self.rs_table.free_count() as usize, instr_queue.size());

        let mut tags = Vec::with_capacity(admit);
        for _ in 0..admit {
            let instr = match instr_queue.dequeue() {
                Some(instr) => instr,
                None => break,
            };

            // Sources are looked up before the destination is renamed, so an
            // instruction reading its own destination waits on the previous
            // writer.
            let mut source_tag = [None, None];
            for (source_index, source) in instr.source().iter().enumerate() {
                if let Some(reg) = source {
                    source_tag[source_index] = self.rat.lookup(*reg);
                }
            }

            let rs_index = match self.rs_table.allocate(instr, cycle) {
                Some(rs_index) => rs_index,
                None => unreachable!("RSTable: no free slot although {} were reserved", admit),
            };

            let rs = self.rs_table.get_mut(rs_index);
            rs.source_tag = source_tag;
            rs.source_ready = [source_tag[0].is_none(), source_tag[1].is_none()];

            if let Some(sink) = instr.sink() {
                self.rat.rename(sink, instr.tag);
            }

            tags.push(instr.tag);
        }
        tags
    }

    pub(crate) fn dump(&self) {
        for rs_index in self.rs_table.select_by_tag(|_| true) {
            trace!("{}", self.rs_table.get(rs_index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::instructions::{Instr, InstrRecord};

    fn backend() -> Backend {
        let mut cpu_config = CPUConfig::default();
        cpu_config.k0_fu_count = 1;
        cpu_config.k1_fu_count = 1;
        cpu_config.k2_fu_count = 1;
        cpu_config.result_bus_count = 1;
        Backend::new(&cpu_config)
    }

    fn queue(records: &[InstrRecord]) -> InstrQueue {
        let mut instr_queue = InstrQueue::new();
        for (index, record) in records.iter().enumerate() {
            instr_queue.enqueue(Instr::new(index as Tag + 1, *record));
        }
        instr_queue
    }

    #[test]
    fn test_dispatch_reads_before_rename() {
        let mut backend = backend();
        // 1: r1 = ..., 2: r1 = r1 + r2
        let mut instr_queue = queue(&[
            InstrRecord::new(0, Some(1), [None, None]),
            InstrRecord::new(0, Some(1), [Some(1), Some(2)]),
        ]);

        assert_eq!(backend.cycle_dispatch(1, &mut instr_queue), vec![1, 2]);

        let waiting = backend.rs_table.get(1);
        assert_eq!(waiting.source_tag, [Some(1), None]);
        assert_eq!(waiting.source_ready, [false, true]);
        assert_eq!(backend.rat.lookup(1), Some(2));
    }

    #[test]
    fn test_dispatch_limited_by_free_slots() {
        let mut backend = backend();
        let records = vec![InstrRecord::new(1, None, [None, None]); 8];
        let mut instr_queue = queue(&records);

        assert_eq!(backend.cycle_dispatch(1, &mut instr_queue).len(), 6);
        assert_eq!(instr_queue.size(), 2);
        assert!(backend.cycle_dispatch(2, &mut instr_queue).is_empty());
    }

    #[test]
    fn test_fire_respects_pool_and_age() {
        let mut backend = backend();
        let mut instr_queue = queue(&[
            InstrRecord::new(0, None, [None, None]),
            InstrRecord::new(0, None, [None, None]),
            InstrRecord::new(2, None, [None, None]),
        ]);
        backend.cycle_dispatch(1, &mut instr_queue);

        // one A unit: tag 1 goes, tag 2 waits, tag 3 (class C) goes
        assert_eq!(backend.cycle_fire(2), vec![1, 3]);
        assert!(backend.cycle_fire(3).is_empty());
    }

    #[test]
    fn test_broadcast_wakes_consumer_next_cycle() {
        let mut backend = backend();
        let mut instr_queue = queue(&[
            InstrRecord::new(0, Some(4), [None, None]),
            InstrRecord::new(1, Some(5), [Some(4), None]),
        ]);
        backend.cycle_dispatch(1, &mut instr_queue);

        assert_eq!(backend.cycle_fire(2), vec![1]);
        assert_eq!(backend.cycle_execute(3), vec![1]);
        assert_eq!(backend.cycle_broadcast(3), vec![1]);
        // the consumer is not ready in the broadcast cycle
        assert!(backend.cycle_fire(3).is_empty());
        assert_eq!(backend.cycle_wakeup(), 1);
        assert_eq!(backend.rat.lookup(4), None);

        assert_eq!(backend.cycle_retire(3), Vec::<Tag>::new());
        assert_eq!(backend.cycle_retire(4), vec![1]);
        assert_eq!(backend.cycle_fire(4), vec![2]);
    }

    #[test]
    fn test_broadcast_of_older_writer_keeps_register_busy() {
        let mut backend = backend();
        let mut instr_queue = queue(&[
            InstrRecord::new(0, Some(3), [None, None]),
            InstrRecord::new(1, Some(3), [Some(7), None]),
        ]);
        backend.cycle_dispatch(1, &mut instr_queue);

        assert_eq!(backend.cycle_fire(2), vec![1, 2]);
        backend.cycle_execute(3);
        assert_eq!(backend.cycle_broadcast(3), vec![1]);
        assert_eq!(backend.rat.lookup(3), Some(2));
        assert_eq!(backend.cycle_broadcast(4), vec![2]);
        assert_eq!(backend.rat.lookup(3), None);
    }

    #[test]
    fn test_destination_unavailable_from_dispatch_until_broadcast() {
        let mut backend = backend();
        let mut instr_queue = queue(&[InstrRecord::new(2, Some(6), [None, None])]);

        backend.cycle_dispatch(1, &mut instr_queue);
        assert_eq!(backend.rat.lookup(6), Some(1));
        assert_eq!(backend.cycle_fire(2), vec![1]);
        assert_eq!(backend.rat.lookup(6), Some(1));
        assert_eq!(backend.cycle_execute(3), vec![1]);
        assert_eq!(backend.rat.lookup(6), Some(1));
        assert_eq!(backend.cycle_broadcast(3), vec![1]);
        assert_eq!(backend.rat.lookup(6), None);
    }

    #[test]
    fn test_unit_held_until_broadcast() {
        let mut backend = backend();
        let mut instr_queue = queue(&[
            InstrRecord::new(1, None, [None, None]),
            InstrRecord::new(1, None, [None, None]),
        ]);
        backend.cycle_dispatch(1, &mut instr_queue);

        assert_eq!(backend.cycle_fire(2), vec![1]);
        backend.cycle_execute(3);
        // completed but not yet broadcast: the unit is still taken
        assert!(backend.cycle_fire(3).is_empty());
        assert_eq!(backend.cycle_broadcast(3), vec![1]);
        assert_eq!(backend.cycle_fire(3), vec![2]);
    }
}
