use std::fmt;
use std::fmt::Display;

use crate::instructions::instructions::{CycleType, Instr, Tag};

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum RSState {
    IDLE,
    BUSY,
}

// A single reservation station
#[derive(Debug)]
pub(crate) struct RS {
    pub(crate) index: u16,
    pub(crate) state: RSState,
    pub(crate) instr: Option<Instr>,
    pub(crate) source_ready: [bool; 2],
    // the tag of the producer a waiting source listens for on the bus
    pub(crate) source_tag: [Option<Tag>; 2],
    pub(crate) fired: bool,
    pub(crate) completed: bool,
    pub(crate) broadcast: bool,
    pub(crate) dispatch_cycle: CycleType,
    pub(crate) fire_cycle: CycleType,
    pub(crate) complete_cycle: CycleType,
    pub(crate) broadcast_cycle: CycleType,
}

impl RS {
    fn new(index: u16) -> Self {
        Self {
            index,
            state: RSState::IDLE,
            instr: None,
            source_ready: [true, true],
            source_tag: [None, None],
            fired: false,
            completed: false,
            broadcast: false,
            dispatch_cycle: 0,
            fire_cycle: 0,
            complete_cycle: 0,
            broadcast_cycle: 0,
        }
    }

    fn reset(&mut self) {
        self.state = RSState::IDLE;
        self.instr = None;
        self.source_ready = [true, true];
        self.source_tag = [None, None];
        self.fired = false;
        self.completed = false;
        self.broadcast = false;
        self.dispatch_cycle = 0;
        self.fire_cycle = 0;
        self.complete_cycle = 0;
        self.broadcast_cycle = 0;
    }

    pub(crate) fn tag(&self) -> Tag {
        self.instr.map_or(0, |instr| instr.tag)
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.source_ready[0] && self.source_ready[1]
    }

    /// Marks every source waiting on `tag` as ready. Returns true if any
    /// source was woken up.
    pub(crate) fn wakeup(&mut self, tag: Tag) -> bool {
        let mut woken = false;
        for source_index in 0..self.source_ready.len() {
            if !self.source_ready[source_index] && self.source_tag[source_index] == Some(tag) {
                self.source_ready[source_index] = true;
                self.source_tag[source_index] = None;
                woken = true;
            }
        }
        woken
    }
}

impl Display for RS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RS{} ", self.index)?;
        match &self.instr {
            None => write!(f, "idle"),
            Some(instr) => {
                write!(f, "{} dispatched@{}", instr, self.dispatch_cycle)?;
                for source_index in 0..self.source_ready.len() {
                    match self.source_tag[source_index] {
                        Some(tag) if !self.source_ready[source_index] => write!(f, " [wait #{}]", tag)?,
                        _ => write!(f, " [ready]")?,
                    }
                }
                if self.broadcast {
                    write!(f, " broadcast")
                } else if self.completed {
                    write!(f, " completed")
                } else if self.fired {
                    write!(f, " fired")
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// The reservation station slots. Slots are addressed by index; code that
/// needs to remember an in-flight instruction keeps the index, never a
/// reference into the table.
pub(crate) struct RSTable {
    free_cnt: u16,
    pub(crate) capacity: u16,
    array: Vec<RS>,
}

impl RSTable {
    pub(crate) fn new(capacity: u16) -> Self {
        let mut array = Vec::with_capacity(capacity as usize);
        for i in 0..capacity {
            array.push(RS::new(i));
        }

        RSTable {
            capacity,
            array,
            free_cnt: capacity,
        }
    }

    pub(crate) fn get(&self, rs_index: u16) -> &RS {
        &self.array[rs_index as usize]
    }

    pub(crate) fn get_mut(&mut self, rs_index: u16) -> &mut RS {
        &mut self.array[rs_index as usize]
    }

    pub(crate) fn free_count(&self) -> u16 {
        self.free_cnt
    }

    pub(crate) fn has_busy(&self) -> bool {
        self.free_cnt < self.capacity
    }

    pub(crate) fn busy_count(&self) -> u16 {
        self.capacity - self.free_cnt
    }

    // lowest free slot first
    pub(crate) fn allocate(&mut self, instr: Instr, cycle: CycleType) -> Option<u16> {
        let rs = self.array.iter_mut().find(|rs| rs.state == RSState::IDLE)?;
        debug_assert!(rs.instr.is_none());

        rs.state = RSState::BUSY;
        rs.instr = Some(instr);
        rs.dispatch_cycle = cycle;
        self.free_cnt -= 1;
        Some(rs.index)
    }

    pub(crate) fn deallocate(&mut self, rs_index: u16) {
        let rs = &mut self.array[rs_index as usize];
        debug_assert!(rs.state == RSState::BUSY, "RSTable: deallocating idle slot {}", rs_index);

        rs.reset();
        self.free_cnt += 1;
    }

    /// The indices of all busy slots matching the filter, oldest instruction
    /// first. Every stage that picks among several candidates goes through
    /// here so the choice never depends on slot placement.
    pub(crate) fn select_by_tag<F>(&self, filter: F) -> Vec<u16>
        where F: Fn(&RS) -> bool {
        let mut selected: Vec<&RS> = self.array.iter()
            .filter(|rs| rs.state == RSState::BUSY && filter(rs))
            .collect();
        selected.sort_by_key(|rs| rs.tag());
        selected.iter().map(|rs| rs.index).collect()
    }

    pub(crate) fn iter_busy_mut(&mut self) -> impl Iterator<Item=&mut RS> {
        self.array.iter_mut().filter(|rs| rs.state == RSState::BUSY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::instructions::InstrRecord;

    fn instr(tag: Tag) -> Instr {
        Instr::new(tag, InstrRecord::new(1, None, [None, None]))
    }

    #[test]
    fn test_allocate_lowest_free() {
        let mut rs_table = RSTable::new(3);
        assert_eq!(rs_table.allocate(instr(1), 1), Some(0));
        assert_eq!(rs_table.allocate(instr(2), 1), Some(1));
        rs_table.deallocate(0);
        assert_eq!(rs_table.allocate(instr(3), 2), Some(0));
        assert_eq!(rs_table.allocate(instr(4), 2), Some(2));
        assert_eq!(rs_table.allocate(instr(5), 2), None);
        assert_eq!(rs_table.free_count(), 0);
        assert_eq!(rs_table.busy_count(), 3);
    }

    #[test]
    fn test_select_by_tag_ignores_slot_order() {
        let mut rs_table = RSTable::new(4);
        rs_table.allocate(instr(1), 1);
        rs_table.allocate(instr(2), 1);
        rs_table.allocate(instr(3), 1);
        rs_table.deallocate(0);
        // tag 4 lands in slot 0, in front of the older instructions
        assert_eq!(rs_table.allocate(instr(4), 2), Some(0));

        let selected = rs_table.select_by_tag(|_| true);
        let tags: Vec<Tag> = selected.iter().map(|&i| rs_table.get(i).tag()).collect();
        assert_eq!(tags, vec![2, 3, 4]);
    }

    #[test]
    fn test_deallocate_resets_slot() {
        let mut rs_table = RSTable::new(1);
        let rs_index = rs_table.allocate(instr(1), 5).unwrap();
        {
            let rs = rs_table.get_mut(rs_index);
            rs.fired = true;
            rs.source_ready = [false, true];
            rs.source_tag = [Some(9), None];
        }
        rs_table.deallocate(rs_index);

        let rs = rs_table.get(rs_index);
        assert_eq!(rs.state, RSState::IDLE);
        assert!(rs.instr.is_none());
        assert!(!rs.fired);
        assert!(rs.is_ready());
        assert!(!rs_table.has_busy());
    }

    #[test]
    fn test_display() {
        let mut rs_table = RSTable::new(2);
        rs_table.allocate(instr(1), 3);
        let rs_index = rs_table.allocate(instr(2), 4).unwrap();
        let rs = rs_table.get_mut(rs_index);
        rs.source_ready = [false, true];
        rs.source_tag = [Some(1), None];

        assert_eq!(format!("{}", rs_table.get(rs_index)), "RS1 #2 00000000 K1 - - - dispatched@4 [wait #1] [ready]");
        assert_eq!(format!("{}", RS::new(0)), "RS0 idle");
    }

    #[test]
    fn test_wakeup_matches_tag() {
        let mut rs_table = RSTable::new(1);
        let rs_index = rs_table.allocate(instr(3), 1).unwrap();
        let rs = rs_table.get_mut(rs_index);
        rs.source_ready = [false, false];
        rs.source_tag = [Some(1), Some(2)];

        assert!(!rs.wakeup(7));
        assert!(rs.wakeup(1));
        assert!(!rs.is_ready());
        assert!(rs.wakeup(2));
        assert!(rs.is_ready());
    }
}
