use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Identifies a fetched instruction. Tags are handed out in fetch order, so
/// a smaller tag always means an older instruction.
pub type Tag = u64;

pub type RegisterType = u16;

pub type CycleType = u64;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum OpClass {
    A,
    B,
    C,
}

impl OpClass {
    pub const ALL: [OpClass; 3] = [OpClass::A, OpClass::B, OpClass::C];

    /// Maps a raw trace opcode to its class. Anything that is not 0, 1 or 2
    /// (including the -1 "no opcode" marker) runs on the B units.
    pub fn from_opcode(op_code: i64) -> OpClass {
        match op_code {
            0 => OpClass::A,
            2 => OpClass::C,
            _ => OpClass::B,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            OpClass::A => 0,
            OpClass::B => 1,
            OpClass::C => 2,
        }
    }
}

pub(crate) fn mnemonic(op_class: OpClass) -> &'static str {
    match op_class {
        OpClass::A => "K0",
        OpClass::B => "K1",
        OpClass::C => "K2",
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InstrRecord {
    pub addr: u32,
    pub op_code: i64,
    pub sink: Option<RegisterType>,
    pub source: [Option<RegisterType>; 2],
}

impl InstrRecord {
    pub fn new(op_code: i64, sink: Option<RegisterType>, source: [Option<RegisterType>; 2]) -> Self {
        Self { addr: 0, op_code, sink, source }
    }

    pub fn op_class(&self) -> OpClass {
        OpClass::from_opcode(self.op_code)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Instr {
    pub tag: Tag,
    pub op_class: OpClass,
    pub record: InstrRecord,
}

impl Instr {
    pub(crate) fn new(tag: Tag, record: InstrRecord) -> Self {
        Self { tag, op_class: record.op_class(), record }
    }

    pub fn sink(&self) -> Option<RegisterType> {
        self.record.sink
    }

    pub fn source(&self) -> [Option<RegisterType>; 2] {
        self.record.source
    }
}

fn fmt_reg(f: &mut fmt::Formatter<'_>, reg: Option<RegisterType>) -> fmt::Result {
    match reg {
        Some(r) => write!(f, " R{}", r),
        None => write!(f, " -"),
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:08x} {}", self.tag, self.record.addr, mnemonic(self.op_class))?;
        fmt_reg(f, self.sink())?;
        for source in self.source() {
            fmt_reg(f, source)?;
        }
        Ok(())
    }
}

/// A pull-only producer of trace records. Returning `None` signals the end
/// of the stream; a source is never rewound.
pub trait InstrSource {
    fn next_instr(&mut self) -> Option<InstrRecord>;
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub code: Vec<InstrRecord>,
}

impl Program {
    pub fn new(code: Vec<InstrRecord>) -> Program {
        Program { code }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

pub struct ProgramSource {
    program: Rc<Program>,
    ip_next_fetch: usize,
}

impl ProgramSource {
    pub fn new(program: &Rc<Program>) -> ProgramSource {
        ProgramSource { program: Rc::clone(program), ip_next_fetch: 0 }
    }
}

impl InstrSource for ProgramSource {
    fn next_instr(&mut self) -> Option<InstrRecord> {
        let record = self.program.code.get(self.ip_next_fetch).copied()?;
        self.ip_next_fetch += 1;
        Some(record)
    }
}

/// The dispatch queue between fetch and the reservation stations. It has no
/// capacity limit; fetch never stalls on it.
#[derive(Default, Debug)]
pub(crate) struct InstrQueue {
    queue: VecDeque<Instr>,
}

impl InstrQueue {
    pub(crate) fn new() -> InstrQueue {
        InstrQueue { queue: VecDeque::new() }
    }

    pub(crate) fn size(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn enqueue(&mut self, instr: Instr) {
        debug_assert!(self.queue.back().map_or(true, |last| last.tag < instr.tag),
                      "InstrQueue: tags must be enqueued in increasing order");
        self.queue.push_back(instr);
    }

    pub(crate) fn dequeue(&mut self) -> Option<Instr> {
        self.queue.pop_front()
    }
}
