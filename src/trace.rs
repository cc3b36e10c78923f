//! Trace emission (spec §4.12, §6 "Trace JSON").
//!
//! `TraceSink` is a generic record builder; every major state change in
//! the engine calls `queue.trace(|w| ...)`, which is a no-op when no
//! sink is installed (spec §4.1).

use crate::time::TimePoint;
use serde_json::{Map, Value};
use std::io::Write;

pub trait TraceSink {
    fn begin(&mut self, time: TimePoint);
    fn field_f64(&mut self, key: &str, value: f64);
    fn field_u64(&mut self, key: &str, value: u64);
    fn field_str(&mut self, key: &str, value: &str);
    fn end(&mut self, record_type: &str);

    /// Called once the simulation stops; writer sinks flush their
    /// buffered records here. No-op for sinks with nowhere to flush to.
    fn flush(&mut self) {}
}

/// Emits the §6 "Trace JSON" schema: a JSON array of
/// `{ "time": ..., "type": ..., <fields>... }` records, written out when
/// the sink is dropped (or flushed explicitly).
pub struct JsonTraceWriter<W: Write> {
    out: W,
    records: Vec<Value>,
    pending: Map<String, Value>,
    pending_time: TimePoint,
}

impl<W: Write> JsonTraceWriter<W> {
    pub fn new(out: W) -> Self {
        JsonTraceWriter {
            out,
            records: Vec::new(),
            pending: Map::new(),
            pending_time: TimePoint::ZERO,
        }
    }

    fn write_out(&mut self) -> std::io::Result<()> {
        let value = Value::Array(std::mem::take(&mut self.records));
        serde_json::to_writer_pretty(&mut self.out, &value)?;
        self.out.write_all(b"\n")
    }
}

impl<W: Write> TraceSink for JsonTraceWriter<W> {
    fn begin(&mut self, time: TimePoint) {
        self.pending = Map::new();
        self.pending_time = time;
        self.pending.insert("time".into(), Value::from(time.as_secs_f64()));
    }

    fn field_f64(&mut self, key: &str, value: f64) {
        self.pending.insert(key.into(), Value::from(value));
    }

    fn field_u64(&mut self, key: &str, value: u64) {
        self.pending.insert(key.into(), Value::from(value));
    }

    fn field_str(&mut self, key: &str, value: &str) {
        self.pending.insert(key.into(), Value::from(value));
    }

    fn end(&mut self, record_type: &str) {
        self.pending.insert("type".into(), Value::from(record_type));
        self.pending.insert("time".into(), Value::from(self.pending_time.as_secs_f64()));
        self.records.push(Value::Object(std::mem::take(&mut self.pending)));
    }

    fn flush(&mut self) {
        if let Err(e) = self.write_out() {
            tracing::error!(error = %e, "failed to flush trace output");
        }
    }
}

/// Buffers records in memory; used by tests that want to assert on the
/// emitted trace stream without touching the filesystem.
#[derive(Default)]
pub struct MemoryTraceSink {
    pub records: Vec<Map<String, Value>>,
    pending: Map<String, Value>,
    pending_time: TimePoint,
}

impl TraceSink for MemoryTraceSink {
    fn begin(&mut self, time: TimePoint) {
        self.pending = Map::new();
        self.pending_time = time;
    }

    fn field_f64(&mut self, key: &str, value: f64) {
        self.pending.insert(key.into(), Value::from(value));
    }

    fn field_u64(&mut self, key: &str, value: u64) {
        self.pending.insert(key.into(), Value::from(value));
    }

    fn field_str(&mut self, key: &str, value: &str) {
        self.pending.insert(key.into(), Value::from(value));
    }

    fn end(&mut self, record_type: &str) {
        self.pending.insert("type".into(), Value::from(record_type));
        self.pending.insert("time".into(), Value::from(self.pending_time.as_secs_f64()));
        self.records.push(std::mem::take(&mut self.pending));
    }
}
