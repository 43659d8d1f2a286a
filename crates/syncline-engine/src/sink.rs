//! Output sinks: where schemas, records and state checkpoints go

use std::io::{self, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Consumer of a sync's output.
///
/// Records for a window are always emitted before the state message that
/// commits that window.
pub trait Sink {
    fn emit_schema(
        &mut self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
        bookmark_properties: Option<&str>,
    ) -> io::Result<()>;

    fn emit_record(
        &mut self,
        stream: &str,
        record: &Value,
        time_extracted: DateTime<Utc>,
    ) -> io::Result<()>;

    fn emit_state(&mut self, state: &Value) -> io::Result<()>;

    /// Push buffered output through
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn emit_schema(
        &mut self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
        bookmark_properties: Option<&str>,
    ) -> io::Result<()> {
        (**self).emit_schema(stream, schema, key_properties, bookmark_properties)
    }

    fn emit_record(
        &mut self,
        stream: &str,
        record: &Value,
        time_extracted: DateTime<Utc>,
    ) -> io::Result<()> {
        (**self).emit_record(stream, record, time_extracted)
    }

    fn emit_state(&mut self, state: &Value) -> io::Result<()> {
        (**self).emit_state(state)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// One line of sink output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        bookmark_properties: Vec<String>,
    },
    Record {
        stream: String,
        record: Value,
        time_extracted: String,
    },
    State {
        value: Value,
    },
}

impl Message {
    fn schema(
        stream: &str,
        schema: &Value,
        key_properties: &[String],
        bookmark_properties: Option<&str>,
    ) -> Self {
        Self::Schema {
            stream: stream.to_string(),
            schema: schema.clone(),
            key_properties: key_properties.to_vec(),
            bookmark_properties: bookmark_properties.map(String::from).into_iter().collect(),
        }
    }

    fn record(stream: &str, record: &Value, time_extracted: DateTime<Utc>) -> Self {
        Self::Record {
            stream: stream.to_string(),
            record: record.clone(),
            time_extracted: time_extracted.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

/// Newline-delimited JSON messages on any writer (stdout by default)
pub struct JsonLinesSink<W: Write> {
    writer: W,
    records: u64,
}

impl<W: Write> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl JsonLinesSink<io::BufWriter<io::Stdout>> {
    pub fn stdout() -> Self {
        Self::new(io::BufWriter::new(io::stdout()))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, message: &Message) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, message).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn emit_schema(
        &mut self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
        bookmark_properties: Option<&str>,
    ) -> io::Result<()> {
        self.write(&Message::schema(stream, schema, key_properties, bookmark_properties))
    }

    fn emit_record(
        &mut self,
        stream: &str,
        record: &Value,
        time_extracted: DateTime<Utc>,
    ) -> io::Result<()> {
        self.records += 1;
        self.write(&Message::record(stream, record, time_extracted))
    }

    fn emit_state(&mut self, state: &Value) -> io::Result<()> {
        self.write(&Message::State {
            value: state.clone(),
        })?;
        // state lines are checkpoints for downstream consumers
        self.writer.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Collects messages in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub messages: Vec<Message>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records emitted for `stream`, in order
    pub fn records(&self, stream: &str) -> Vec<&Value> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Record {
                    stream: s, record, ..
                } if s == stream => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Every state message, in order
    pub fn states(&self) -> Vec<&Value> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::State { value } => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Streams a schema was emitted for
    pub fn schemas(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Schema { stream, .. } => Some(stream.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Sink for MemorySink {
    fn emit_schema(
        &mut self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
        bookmark_properties: Option<&str>,
    ) -> io::Result<()> {
        self.messages.push(Message::schema(
            stream,
            schema,
            key_properties,
            bookmark_properties,
        ));
        Ok(())
    }

    fn emit_record(
        &mut self,
        stream: &str,
        record: &Value,
        time_extracted: DateTime<Utc>,
    ) -> io::Result<()> {
        self.messages
            .push(Message::record(stream, record, time_extracted));
        Ok(())
    }

    fn emit_state(&mut self, state: &Value) -> io::Result<()> {
        self.messages.push(Message::State {
            value: state.clone(),
        });
        Ok(())
    }
}
