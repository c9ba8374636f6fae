//! Event → queue message encoding.
//!
//! The body is double-encoded: the consumer first decodes the body, then
//! decodes the string in its `Message` member.
//!
//! ```text
//! {"Message":"{\"createDate\":1473453024.553,\"email\":\"a@b.c\",\"event\":\"verified\",...,\"ts\":1526936236.748,\"uid\":\"…\"}"}
//! ```
//!
//! Attributes: `event_type` always, `email_domain` when the event has an
//! email. Attributes are observational only; routing must not depend on them.

use std::collections::{BTreeMap, BTreeSet};

use mrc_reconcile::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttribute {
    #[serde(rename = "DataType")]
    pub data_type: String,
    #[serde(rename = "StringValue")]
    pub string_value: String,
}

impl MessageAttribute {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".to_string(),
            string_value: value.into(),
        }
    }
}

/// One encoded event, ready for a transport.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueMessage {
    /// Pipeline-assigned identifier; unique within any batch.
    pub id: String,
    /// The event this message was built from.
    pub event: Event,
    pub body: String,
    pub attributes: BTreeMap<String, MessageAttribute>,
}

/// Encodes events into the downstream message format.
#[derive(Clone, Debug)]
pub struct MessageCodec {
    epoch_ms_fields: BTreeSet<String>,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::with_epoch_ms_fields(["createDate"])
    }
}

impl MessageCodec {
    /// Fields named here hold epoch milliseconds and are sent as epoch
    /// seconds (float).
    pub fn with_epoch_ms_fields<T: Into<String>>(fields: impl IntoIterator<Item = T>) -> Self {
        Self {
            epoch_ms_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Inner message object (before double encoding).
    pub fn message_object(&self, event: &Event) -> Value {
        let mut obj = Map::new();
        for (name, value) in &event.fields {
            obj.insert(name.clone(), self.field_value(name, value));
        }
        obj.insert("uid".to_string(), Value::String(event.key.clone()));
        obj.insert(
            "event".to_string(),
            Value::String(event.kind.wire_name().to_string()),
        );
        obj.insert(
            "ts".to_string(),
            serde_json::json!(event.timestamp.timestamp_millis() as f64 / 1000.0),
        );
        Value::Object(obj)
    }

    fn field_value(&self, name: &str, value: &str) -> Value {
        if self.epoch_ms_fields.contains(name) {
            if let Ok(ms) = value.trim().parse::<i64>() {
                return serde_json::json!(ms as f64 / 1000.0);
            }
        }
        Value::String(value.to_string())
    }

    pub fn encode(&self, id: impl Into<String>, event: &Event) -> QueueMessage {
        let inner = self.message_object(event).to_string();
        let body = serde_json::json!({ "Message": inner }).to_string();

        let mut attributes = BTreeMap::new();
        attributes.insert(
            "event_type".to_string(),
            MessageAttribute::string(event.kind.wire_name()),
        );
        if let Some(domain) = event
            .field("email")
            .and_then(|e| e.split('@').nth(1))
            .filter(|d| !d.is_empty())
        {
            attributes.insert("email_domain".to_string(), MessageAttribute::string(domain));
        }

        QueueMessage {
            id: id.into(),
            event: event.clone(),
            body,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mrc_reconcile::{EventKind, Record, Source};

    fn event(kind: EventKind, email: Option<&str>) -> Event {
        let mut rec = Record::new("0123456789abcdef0123456789abcdef", Source::Primary)
            .with_field("locale", "en-US")
            .with_field("createDate", "1473453024553");
        if let Some(e) = email {
            rec = rec.with_field("email", e);
        }
        Event::new(kind, rec, Utc.timestamp_millis_opt(1_526_936_236_748).unwrap())
    }

    #[test]
    fn body_is_double_encoded() {
        let msg = MessageCodec::default().encode("m-1", &event(EventKind::Create, Some("u@t.com")));

        let outer: Value = serde_json::from_str(&msg.body).unwrap();
        let inner: Value = serde_json::from_str(outer["Message"].as_str().unwrap()).unwrap();

        assert_eq!(inner["event"], "verified");
        assert_eq!(inner["uid"], "0123456789abcdef0123456789abcdef");
        assert_eq!(inner["email"], "u@t.com");
        assert_eq!(inner["locale"], "en-US");
        assert_eq!(inner["createDate"].as_f64(), Some(1_473_453_024.553));
        assert_eq!(inner["ts"].as_f64(), Some(1_526_936_236.748));
        assert!(inner.get("timestamp").is_none());
    }

    #[test]
    fn attributes_carry_event_type_and_domain() {
        let msg = MessageCodec::default().encode("m-1", &event(EventKind::Update, Some("u@t.com")));
        assert_eq!(
            msg.attributes["event_type"],
            MessageAttribute::string("primaryEmailChanged")
        );
        assert_eq!(msg.attributes["email_domain"].string_value, "t.com");

        let v = serde_json::to_value(&msg.attributes["event_type"]).unwrap();
        assert_eq!(v["DataType"], "String");
    }

    #[test]
    fn no_email_means_no_domain_attribute() {
        let msg = MessageCodec::default().encode("m-2", &event(EventKind::Delete, None));
        assert!(!msg.attributes.contains_key("email_domain"));
        assert_eq!(msg.attributes.len(), 1);
    }

    #[test]
    fn non_numeric_epoch_field_is_sent_as_string() {
        let mut ev = event(EventKind::Create, None);
        ev.fields.insert("createDate".to_string(), "unknown".to_string());
        let obj = MessageCodec::default().message_object(&ev);
        assert_eq!(obj["createDate"], "unknown");
    }
}
