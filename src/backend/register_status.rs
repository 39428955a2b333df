use crate::instructions::instructions::{RegisterType, Tag};

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) struct RegisterStatusEntry {
    // the most recently dispatched writer of the register
    pub(crate) tag: Option<Tag>,
    pub(crate) ready: bool,
}

/// The register status table. For every architectural register it records
/// which in-flight instruction will produce its next value. A reader that
/// finds the entry not ready waits for a broadcast of that tag.
pub(crate) struct RegisterStatusTable {
    table: Vec<RegisterStatusEntry>,
}

impl RegisterStatusTable {
    pub fn new(register_count: u16) -> Self {
        let mut table = Vec::with_capacity(register_count as usize);
        for _ in 0..register_count {
            table.push(RegisterStatusEntry { tag: None, ready: true });
        }
        Self { table }
    }

    pub fn get(&self, reg: RegisterType) -> &RegisterStatusEntry {
        debug_assert!((reg as usize) < self.table.len(), "register {} out of range", reg);
        &self.table[reg as usize]
    }

    pub fn lookup(&self, reg: RegisterType) -> Option<Tag> {
        let entry = self.get(reg);
        if entry.ready {
            None
        } else {
            entry.tag
        }
    }

    pub fn rename(&mut self, reg: RegisterType, tag: Tag) {
        let entry = &mut self.table[reg as usize];
        entry.tag = Some(tag);
        entry.ready = false;
    }

    /// Marks the register ready, but only if `tag` is still its newest
    /// writer. A younger writer that was dispatched in between keeps the
    /// register busy. Returns true if the entry changed.
    pub fn complete(&mut self, reg: RegisterType, tag: Tag) -> bool {
        let entry = &mut self.table[reg as usize];
        if entry.tag == Some(tag) {
            entry.ready = true;
            true
        } else {
            false
        }
    }

}
