use std::fmt;
use std::io;
use std::io::Write;

use log::{info, warn};

use crate::cpu::Trace;
use crate::instructions::instructions::{CycleType, Tag};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum EventKind {
    Fetched,
    Dispatched,
    Scheduled,
    Executed,
    Broadcast,
    Retired,
}

impl EventKind {
    pub fn operation(&self) -> &'static str {
        match self {
            EventKind::Fetched => "FETCHED",
            EventKind::Dispatched => "DISPATCHED",
            EventKind::Scheduled => "SCHEDULED",
            EventKind::Executed => "EXECUTED",
            EventKind::Broadcast => "BROADCAST",
            EventKind::Retired => "STATE UPDATE",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TraceEvent {
    pub cycle: CycleType,
    pub kind: EventKind,
    pub tag: Tag,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.cycle, self.kind.operation(), self.tag)
    }
}

/// Receives every stage transition as the simulation runs, in the order
/// the engine performs them.
pub trait TraceSink {
    fn event(&mut self, event: &TraceEvent);

    fn finish(&mut self) {}
}

// Keeps every event in memory. Clones share the buffer, so one clone goes
// into the `CPU` while the test reads the other.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    events: std::rc::Rc<std::cell::RefCell<Vec<TraceEvent>>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn new() -> RecordingSink {
        RecordingSink::default()
    }

    pub(crate) fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }
}

#[cfg(test)]
impl TraceSink for RecordingSink {
    fn event(&mut self, event: &TraceEvent) {
        self.events.borrow_mut().push(*event);
    }
}

pub struct LogSink {
    trace: Trace,
}

impl LogSink {
    pub fn new(trace: Trace) -> LogSink {
        LogSink { trace }
    }

    fn enabled(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Fetched => self.trace.fetch,
            EventKind::Dispatched => self.trace.dispatch,
            EventKind::Scheduled => self.trace.schedule,
            EventKind::Executed => self.trace.execute,
            EventKind::Broadcast => self.trace.broadcast,
            EventKind::Retired => self.trace.retire,
        }
    }
}

impl TraceSink for LogSink {
    fn event(&mut self, event: &TraceEvent) {
        if self.enabled(event.kind) {
            info!("[Cycle:{}] {} #{}", event.cycle, event.kind.operation(), event.tag);
        }
    }
}

/// Writes the event log as `CYCLE\tOPERATION\tINSTRUCTION` lines.
pub struct WriterSink<W: Write> {
    writer: W,
    failed: bool,
}

impl<W: Write> WriterSink<W> {
    pub fn new(mut writer: W) -> io::Result<WriterSink<W>> {
        writeln!(writer, "CYCLE\tOPERATION\tINSTRUCTION")?;
        Ok(WriterSink { writer, failed: false })
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer
    }

    fn report(&mut self, err: io::Error) {
        if !self.failed {
            warn!("Failed to write event log: {}", err);
            self.failed = true;
        }
    }
}

impl<W: Write> TraceSink for WriterSink<W> {
    fn event(&mut self, event: &TraceEvent) {
        if let Err(err) = writeln!(self.writer, "{}", event) {
            self.report(err);
        }
    }

    fn finish(&mut self) {
        if let Err(err) = self.writer.flush() {
            self.report(err);
        }
    }
}

impl TraceSink for Vec<Box<dyn TraceSink>> {
    fn event(&mut self, event: &TraceEvent) {
        for sink in self.iter_mut() {
            sink.event(event);
        }
    }

    fn finish(&mut self) {
        for sink in self.iter_mut() {
            sink.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_sink_layout() {
        let mut sink = WriterSink::new(Vec::new()).unwrap();
        sink.event(&TraceEvent { cycle: 1, kind: EventKind::Fetched, tag: 1 });
        sink.event(&TraceEvent { cycle: 5, kind: EventKind::Retired, tag: 1 });
        sink.finish();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "CYCLE\tOPERATION\tINSTRUCTION\n1\tFETCHED\t1\n5\tSTATE UPDATE\t1\n");
    }

    #[test]
    fn test_fan_out_reaches_every_sink() {
        let first = RecordingSink::new();
        let second = RecordingSink::new();
        let mut sinks: Vec<Box<dyn TraceSink>> = vec![
            Box::new(first.clone()),
            Box::new(LogSink::new(Trace::default())),
            Box::new(second.clone()),
        ];
        let event = TraceEvent { cycle: 2, kind: EventKind::Dispatched, tag: 4 };
        sinks.event(&event);
        sinks.finish();

        assert_eq!(first.events(), vec![event]);
        assert_eq!(second.events(), vec![event]);
    }
}
