use log::trace;

use crate::cpu::CPUConfig;
use crate::instructions::instructions::{Instr, InstrQueue, InstrSource, Tag};

pub(crate) struct TagAllocator {
    next_tag: Tag,
}

impl TagAllocator {
    pub(crate) fn new() -> TagAllocator {
        TagAllocator { next_tag: 1 }
    }

    pub(crate) fn allocate(&mut self) -> Tag {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }
}

pub(crate) struct Frontend {
    source: Box<dyn InstrSource>,
    n_wide: u16,
    tag_allocator: TagAllocator,
    // once the source ran dry it is never asked again
    pub(crate) exhausted: bool,
}

impl Frontend {
    pub(crate) fn new(cpu_config: &CPUConfig, source: Box<dyn InstrSource>) -> Frontend {
        Frontend {
            source,
            n_wide: cpu_config.fetch_n_wide,
            tag_allocator: TagAllocator::new(),
            exhausted: false,
        }
    }

    /// Fetches up to `n_wide` instructions into the dispatch queue and
    /// returns their tags.
    pub(crate) fn do_cycle(&mut self, instr_queue: &mut InstrQueue) -> Vec<Tag> {
        let mut tags = Vec::with_capacity(self.n_wide as usize);
        if self.exhausted {
            return tags;
        }

        for _ in 0..self.n_wide {
            let record = match self.source.next_instr() {
                Some(record) => record,
                None => {
                    trace!("Frontend: instruction source exhausted");
                    self.exhausted = true;
                    break;
                }
            };

            let instr = Instr::new(self.tag_allocator.allocate(), record);
            trace!("Frontend: fetched {}", instr);

            tags.push(instr.tag);
            instr_queue.enqueue(instr);
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::instructions::instructions::{InstrRecord, Program, ProgramSource};

    fn frontend(n_wide: u16, len: usize) -> Frontend {
        let mut cpu_config = CPUConfig::default();
        cpu_config.fetch_n_wide = n_wide;
        let program = Rc::new(Program::new(vec![InstrRecord::new(1, None, [None, None]); len]));
        Frontend::new(&cpu_config, Box::new(ProgramSource::new(&program)))
    }

    #[test]
    fn test_fetch_n_wide() {
        let mut frontend = frontend(2, 5);
        let mut instr_queue = InstrQueue::new();

        assert_eq!(frontend.do_cycle(&mut instr_queue), vec![1, 2]);
        assert_eq!(frontend.do_cycle(&mut instr_queue), vec![3, 4]);
        assert!(!frontend.exhausted);
        assert_eq!(frontend.do_cycle(&mut instr_queue), vec![5]);
        assert!(frontend.exhausted);
        assert!(frontend.do_cycle(&mut instr_queue).is_empty());
        assert_eq!(instr_queue.size(), 5);
    }

    #[test]
    fn test_exhaustion_detected_on_empty_fetch() {
        let mut frontend = frontend(2, 2);
        let mut instr_queue = InstrQueue::new();

        assert_eq!(frontend.do_cycle(&mut instr_queue), vec![1, 2]);
        // the source only reports its end when asked for more
        assert!(!frontend.exhausted);
        assert!(frontend.do_cycle(&mut instr_queue).is_empty());
        assert!(frontend.exhausted);
    }

    #[test]
    fn test_tags_strictly_increase() {
        let mut tag_allocator = TagAllocator::new();
        let mut last = 0;
        for _ in 0..100 {
            let tag = tag_allocator.allocate();
            assert!(tag > last);
            last = tag;
        }
    }
}
