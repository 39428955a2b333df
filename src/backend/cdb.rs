use crate::instructions::instructions::{CycleType, Tag};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct CDBRequest {
    pub(crate) complete_cycle: CycleType,
    pub(crate) tag: Tag,
    pub(crate) rs_index: u16,
}

// `capacity` result buses, one tag each per cycle
pub(crate) struct CDB {
    pub(crate) capacity: u16,
    // tags broadcast in the current cycle, in bus order
    broadcast_buffer: Vec<Tag>,
}

impl CDB {
    pub(crate) fn new(capacity: u16) -> CDB {
        CDB {
            capacity,
            broadcast_buffer: Vec::with_capacity(capacity as usize),
        }
    }

    /// Picks the requests that win a bus this cycle: earliest completion
    /// first, older tag on a tie. At most `capacity` requests are granted.
    pub(crate) fn arbitrate(&mut self, mut requests: Vec<CDBRequest>) -> Vec<CDBRequest> {
        requests.sort_by_key(|req| (req.complete_cycle, req.tag));
        requests.truncate(self.capacity as usize);

        self.broadcast_buffer.clear();
        self.broadcast_buffer.extend(requests.iter().map(|req| req.tag));
        requests
    }

    pub(crate) fn broadcasts(&self) -> &[Tag] {
        &self.broadcast_buffer
    }
}
