use crate::cpu::CPUConfig;
use crate::instructions::instructions::{CycleType, OpClass};

/// Every instruction spends exactly this many cycles in its functional unit
/// before it can compete for a result bus.
pub(crate) const EXECUTE_LATENCY: CycleType = 1;

#[derive(Debug)]
pub(crate) struct EUPool {
    pub(crate) op_class: OpClass,
    pub(crate) capacity: u16,
    busy: u16,
    // total cycles a unit of this pool was in use, for utilisation stats
    pub(crate) utilisation: u64,
}

impl EUPool {
    fn new(op_class: OpClass, capacity: u16) -> Self {
        Self { op_class, capacity, busy: 0, utilisation: 0 }
    }

    pub(crate) fn has_idle(&self) -> bool {
        self.busy < self.capacity
    }

    pub(crate) fn busy(&self) -> u16 {
        self.busy
    }
}

/// The three functional unit pools. A unit is taken when an instruction
/// fires and handed back when its result is broadcast.
pub(crate) struct EUTable {
    pools: [EUPool; 3],
}

impl EUTable {
    pub(crate) fn new(cpu_config: &CPUConfig) -> EUTable {
        EUTable {
            pools: OpClass::ALL.map(|op_class| EUPool::new(op_class, cpu_config.fu_count(op_class))),
        }
    }

    pub(crate) fn get(&self, op_class: OpClass) -> &EUPool {
        &self.pools[op_class.index()]
    }

    pub(crate) fn allocate(&mut self, op_class: OpClass) -> bool {
        let pool = &mut self.pools[op_class.index()];
        if !pool.has_idle() {
            return false;
        }

        pool.busy += 1;
        true
    }

    pub(crate) fn deallocate(&mut self, op_class: OpClass) {
        let pool = &mut self.pools[op_class.index()];
        debug_assert!(pool.busy > 0, "EUTable: no busy {:?} unit to release", op_class);
        pool.busy -= 1;
    }

    pub(crate) fn cycle_utilisation(&mut self) {
        for pool in &mut self.pools {
            pool.utilisation += pool.busy as u64;
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item=&EUPool> {
        self.pools.iter()
    }
}
