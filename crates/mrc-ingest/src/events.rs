//! JSON-lines event format.
//!
//! One object per line:
//!
//! ```text
//! {"createDate":"1473453024553","email":"a@b.c","event":"verified","locale":"en","ts":1526936236.748,"uid":"…"}
//! ```
//!
//! `event` is the wire name, `ts` is the run timestamp in epoch seconds, and
//! every other member is a normalized field value kept as a string.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, Write};

use chrono::{DateTime, TimeZone, Utc};
use mrc_reconcile::{Event, EventKind};
use serde_json::{Map, Value};

#[derive(Debug)]
pub enum EventLineError {
    /// The reader failed. Not recoverable.
    Io(String),
    /// One line could not be decoded into an event. Skip and continue.
    Decode { line_no: u64, message: String },
    /// The input is not in the expected format at all. Not recoverable.
    Malformed { line_no: u64, message: String },
}

impl EventLineError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EventLineError::Decode { .. })
    }
}

impl fmt::Display for EventLineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventLineError::Io(msg) => write!(f, "event stream io error: {msg}"),
            EventLineError::Decode { line_no, message } => {
                write!(f, "event line {line_no}: {message}")
            }
            EventLineError::Malformed { line_no, message } => {
                write!(f, "malformed input at line {line_no}: {message}")
            }
        }
    }
}

impl std::error::Error for EventLineError {}

fn epoch_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_millis() as f64 / 1000.0
}

/// JSON object for one event (wire name in `event`, key in `uid`).
pub fn event_to_json(event: &Event) -> Value {
    let mut obj = Map::new();
    for (k, v) in &event.fields {
        obj.insert(k.clone(), Value::String(v.clone()));
    }
    obj.insert("uid".to_string(), Value::String(event.key.clone()));
    obj.insert(
        "event".to_string(),
        Value::String(event.kind.wire_name().to_string()),
    );
    obj.insert("ts".to_string(), serde_json::json!(epoch_seconds(event.timestamp)));
    Value::Object(obj)
}

pub fn write_event_line<W: Write>(w: &mut W, event: &Event) -> std::io::Result<()> {
    let line = serde_json::to_string(&event_to_json(event))?;
    writeln!(w, "{line}")
}

fn decode_event(raw: &str) -> Result<Event, String> {
    let v: Value = serde_json::from_str(raw).map_err(|e| format!("invalid json: {e}"))?;
    let Value::Object(obj) = v else {
        return Err("expected a json object".to_string());
    };

    let kind = obj
        .get("event")
        .and_then(Value::as_str)
        .and_then(EventKind::from_wire_name)
        .ok_or_else(|| "missing or unknown 'event'".to_string())?;
    let key = obj
        .get("uid")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing 'uid'".to_string())?
        .to_string();
    let ts = obj
        .get("ts")
        .and_then(Value::as_f64)
        .ok_or_else(|| "missing numeric 'ts'".to_string())?;
    let timestamp = Utc
        .timestamp_millis_opt((ts * 1000.0).round() as i64)
        .single()
        .ok_or_else(|| format!("'ts' out of range: {ts}"))?;

    let mut fields = BTreeMap::new();
    for (k, v) in obj {
        if matches!(k.as_str(), "event" | "uid" | "ts") {
            continue;
        }
        let value = match v {
            Value::String(s) => s,
            Value::Null => continue,
            other => other.to_string(),
        };
        fields.insert(k, value);
    }

    Ok(Event {
        kind,
        key,
        fields,
        timestamp,
    })
}

/// Streams events from a JSON-lines reader. Blank lines are skipped.
pub struct EventLineReader<R> {
    inner: R,
    line_no: u64,
    buf: String,
}

impl<R: BufRead> EventLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line_no: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for EventLineReader<R> {
    type Item = Result<Event, EventLineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.inner.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(EventLineError::Io(e.to_string()))),
            }
            self.line_no += 1;
            let raw = self.buf.trim();
            if raw.is_empty() {
                continue;
            }
            return Some(decode_event(raw).map_err(|message| EventLineError::Decode {
                line_no: self.line_no,
                message,
            }));
        }
    }
}
