use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::PipelineError;

/// Identifier as the producer sent it: numeric ids stay numbers, opaque ids stay strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(Number),
    Text(String),
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            EntityId::Number(id) => write!(f, "{}", id),
            EntityId::Text(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Number(id.into())
    }
}

impl From<i32> for EntityId {
    fn from(id: i32) -> Self {
        EntityId::Number(id.into())
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        EntityId::Number(id.into())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Text(id)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        match id {
            EntityId::Number(id) => Value::Number(id),
            EntityId::Text(id) => Value::String(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    TodoCreated,
    TodoCompleted,
    TodoDueSoon,
    UserRegistered,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::TodoCreated,
        EventType::TodoCompleted,
        EventType::TodoDueSoon,
        EventType::UserRegistered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TodoCreated => "todo_created",
            EventType::TodoCompleted => "todo_completed",
            EventType::TodoDueSoon => "todo_due_soon",
            EventType::UserRegistered => "user_registered",
        }
    }
}

impl FromStr for EventType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PipelineError::Decode(format!("Unknown event type '{}'", s)))
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A domain occurrence read from the inbound queue.
///
/// Only `type` is checked on the wire. The rest of the payload stays untyped until a
/// route asks for a field, so an event of a type nobody routes always decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Event {
    pub fn decode(payload: &[u8]) -> Result<Self, PipelineError> {
        let event = serde_json::from_slice::<Self>(payload)
            .map_err(|e| PipelineError::Decode(format!("Invalid event payload: {}", e)))?;

        if event.event_type.trim().is_empty() {
            return Err(PipelineError::Decode("Event type is blank".to_string()));
        }

        Ok(event)
    }

    pub fn kind(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    /// A string field some route needs.
    pub fn text(&self, field: &str) -> Result<&str, PipelineError> {
        match self.get(field) {
            Some(Value::String(value)) => Ok(value.as_str()),
            Some(_) => Err(PipelineError::mistyped_field(&self.event_type, field, "a string")),
            None => Err(PipelineError::missing_field(&self.event_type, field)),
        }
    }

    /// An id field some route needs. Any JSON number or string is accepted.
    pub fn entity_id(&self, field: &str) -> Result<EntityId, PipelineError> {
        match self.get(field) {
            Some(Value::Number(id)) => Ok(EntityId::Number(id.clone())),
            Some(Value::String(id)) => Ok(EntityId::Text(id.clone())),
            Some(_) => Err(PipelineError::mistyped_field(
                &self.event_type,
                field,
                "a number or string",
            )),
            None => Err(PipelineError::missing_field(&self.event_type, field)),
        }
    }

    fn with_fields<const N: usize>(kind: EventType, fields: [(&str, Value); N]) -> Self {
        Self {
            event_type: kind.as_str().to_string(),
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    pub fn todo_created(
        user_id: impl Into<EntityId>,
        todo_id: impl Into<EntityId>,
        title: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self::with_fields(
            EventType::TodoCreated,
            [
                ("userId", id_value(user_id)),
                ("todoId", id_value(todo_id)),
                ("title", Value::String(title.into())),
                ("timestamp", Value::String(timestamp.into())),
            ],
        )
    }

    pub fn todo_completed(
        user_id: impl Into<EntityId>,
        title: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self::with_fields(
            EventType::TodoCompleted,
            [
                ("userId", id_value(user_id)),
                ("title", Value::String(title.into())),
                ("timestamp", Value::String(timestamp.into())),
            ],
        )
    }

    pub fn todo_due_soon(
        user_id: impl Into<EntityId>,
        title: impl Into<String>,
        due_date: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self::with_fields(
            EventType::TodoDueSoon,
            [
                ("userId", id_value(user_id)),
                ("title", Value::String(title.into())),
                ("dueDate", Value::String(due_date.into())),
                ("timestamp", Value::String(timestamp.into())),
            ],
        )
    }

    pub fn user_registered(
        user_id: impl Into<EntityId>,
        username: impl Into<String>,
        email: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self::with_fields(
            EventType::UserRegistered,
            [
                ("userId", id_value(user_id)),
                ("username", Value::String(username.into())),
                ("email", Value::String(email.into())),
                ("timestamp", Value::String(timestamp.into())),
            ],
        )
    }
}

fn id_value(id: impl Into<EntityId>) -> Value {
    let id: EntityId = id.into();
    id.into()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_camel_case_fields_and_ignores_extras() {
        let payload = json!({
            "type": "todo_created",
            "userId": 42,
            "todoId": "a1b2",
            "title": "Buy milk",
            "username": "alice",
            "priority": "high",
            "timestamp": "2024-01-01T00:00:00Z"
        });

        let event = Event::decode(payload.to_string().as_bytes()).unwrap();

        assert_eq!(event.kind(), Some(EventType::TodoCreated));
        assert_eq!(event.entity_id("userId").unwrap(), EntityId::from(42));
        assert_eq!(event.entity_id("todoId").unwrap(), EntityId::from("a1b2"));
        assert_eq!(event.text("title").unwrap(), "Buy milk");
        assert_eq!(event.get("priority"), Some(&json!("high")));
    }

    #[test]
    fn other_fields_are_not_checked_at_decode_time() {
        let bodies: [&[u8]; 3] = [
            br#"{"type":"unknown_thing","title":5}"#,
            br#"{"type":"unknown_thing","userId":1.5}"#,
            br#"{"type":"todo_completed","userId":42,"title":"Buy milk","email":7}"#,
        ];

        for body in bodies {
            assert!(
                Event::decode(body).is_ok(),
                "expected {} to decode",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn ids_accept_any_json_number_or_string() {
        let payload = json!({
            "type": "todo_created",
            "userId": 1.5,
            "todoId": u64::MAX,
            "ownerId": "u-1"
        });
        let event = Event::decode(payload.to_string().as_bytes()).unwrap();

        let user_id = event.entity_id("userId").unwrap();
        assert_eq!(serde_json::to_value(user_id).unwrap(), json!(1.5));
        assert_eq!(event.entity_id("todoId").unwrap(), EntityId::from(u64::MAX));
        assert_eq!(event.entity_id("ownerId").unwrap(), EntityId::from("u-1"));
    }

    #[test]
    fn fields_are_typed_on_access() {
        let event =
            Event::decode(br#"{"type":"todo_created","userId":true,"title":5,"dueDate":null}"#)
                .unwrap();

        for result in [
            event.entity_id("userId").map(|_| ()),
            event.text("title").map(|_| ()),
            event.text("dueDate").map(|_| ()),
            event.text("timestamp").map(|_| ()),
        ] {
            assert!(matches!(result, Err(PipelineError::Decode(_))));
        }
    }

    #[test]
    fn constructors_round_trip_through_the_wire_format() {
        let event = Event::todo_due_soon(42, "Buy milk", "2024-01-02", "2024-01-01T00:00:00Z");

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "todo_due_soon",
                "userId": 42,
                "title": "Buy milk",
                "dueDate": "2024-01-02",
                "timestamp": "2024-01-01T00:00:00Z"
            })
        );
        assert_eq!(Event::decode(value.to_string().as_bytes()).unwrap(), event);
    }

    #[test]
    fn unknown_types_still_decode() {
        let event = Event::decode(br#"{"type":"unknown_thing","foo":1}"#).unwrap();
        assert_eq!(event.event_type, "unknown_thing");
        assert_eq!(event.kind(), None);
    }

    #[test]
    fn rejects_bodies_without_a_usable_type() {
        let bodies: [&[u8]; 5] = [
            b"not json",
            br#"{"userId":1}"#,
            br#"{"type":7}"#,
            br#"{"type":"  "}"#,
            br#""todo_created""#,
        ];

        for body in bodies {
            assert!(
                matches!(Event::decode(body), Err(PipelineError::Decode(_))),
                "expected decode failure for {}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
