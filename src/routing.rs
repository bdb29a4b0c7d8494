use std::collections::HashMap;

use crate::{
    error::PipelineError,
    models::{
        event::{EntityId, Event, EventType},
        message::{Channel, Message, Notification},
    },
};

pub type Transform = fn(&Event) -> Result<Notification, PipelineError>;

/// One derived message: where it goes and how it is built from the event.
#[derive(Clone, Copy)]
pub struct Route {
    pub channel: Channel,
    pub transform: Transform,
}

impl Route {
    pub const fn new(channel: Channel, transform: Transform) -> Self {
        Self { channel, transform }
    }
}

/// Maps an event type to the ordered list of messages it fans out to.
#[derive(Clone)]
pub struct RoutingTable {
    routes: HashMap<String, Vec<Route>>,
}

impl RoutingTable {
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Sets the routes for `event_type`, replacing any existing row.
    pub fn insert(&mut self, event_type: impl Into<String>, routes: Vec<Route>) -> &mut Self {
        self.routes.insert(event_type.into(), routes);
        self
    }

    pub fn routes_for(&self, event_type: &str) -> &[Route] {
        self.routes
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Derives every message for `event`, in table order.
    ///
    /// Unknown types yield an empty list without any field being read. A known type
    /// missing a field its routes need fails as a whole, so no partial list is ever
    /// returned.
    pub fn route(&self, event: &Event) -> Result<Vec<Message>, PipelineError> {
        self.routes_for(&event.event_type)
            .iter()
            .map(|route| {
                Ok(Message {
                    channel: route.channel,
                    notification: (route.transform)(event)?,
                })
            })
            .collect()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table
            .insert(
                EventType::TodoCreated.as_str(),
                vec![
                    Route::new(Channel::Email, welcome_email),
                    Route::new(Channel::Push, todo_created_push),
                ],
            )
            .insert(
                EventType::TodoCompleted.as_str(),
                vec![Route::new(Channel::Push, todo_completed_push)],
            )
            .insert(
                EventType::TodoDueSoon.as_str(),
                vec![Route::new(Channel::Email, due_reminder_email)],
            )
            .insert(
                EventType::UserRegistered.as_str(),
                vec![Route::new(Channel::Email, welcome_user_email)],
            );
        table
    }
}

fn user_id(event: &Event) -> Result<EntityId, PipelineError> {
    event.entity_id("userId")
}

fn title(event: &Event) -> Result<&str, PipelineError> {
    event.text("title")
}

fn timestamp(event: &Event) -> Result<String, PipelineError> {
    event.text("timestamp").map(str::to_string)
}

pub fn welcome_email(event: &Event) -> Result<Notification, PipelineError> {
    Ok(Notification::WelcomeEmail {
        user_id: user_id(event)?,
        todo_title: title(event)?.to_string(),
        timestamp: timestamp(event)?,
    })
}

pub fn todo_created_push(event: &Event) -> Result<Notification, PipelineError> {
    Ok(Notification::TodoCreatedPush {
        user_id: user_id(event)?,
        title: "New Todo Created".to_string(),
        body: format!("\"{}\" has been added to your list", title(event)?),
        timestamp: timestamp(event)?,
    })
}

pub fn todo_completed_push(event: &Event) -> Result<Notification, PipelineError> {
    Ok(Notification::TodoCompletedPush {
        user_id: user_id(event)?,
        title: "Todo Completed!".to_string(),
        body: format!("Great job! You completed \"{}\"", title(event)?),
        timestamp: timestamp(event)?,
    })
}

pub fn due_reminder_email(event: &Event) -> Result<Notification, PipelineError> {
    Ok(Notification::DueReminderEmail {
        user_id: user_id(event)?,
        todo_title: title(event)?.to_string(),
        due_date: event.text("dueDate")?.to_string(),
        timestamp: timestamp(event)?,
    })
}

pub fn welcome_user_email(event: &Event) -> Result<Notification, PipelineError> {
    Ok(Notification::WelcomeUserEmail {
        user_id: user_id(event)?,
        username: event.text("username")?.to_string(),
        email: event.text("email")?.to_string(),
        timestamp: timestamp(event)?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const T: &str = "2024-01-01T00:00:00Z";

    fn kinds(messages: &[Message]) -> Vec<(Channel, &'static str)> {
        messages
            .iter()
            .map(|m| (m.channel, m.notification.kind()))
            .collect()
    }

    #[test]
    fn todo_created_fans_out_to_email_then_push() {
        let event = Event::todo_created(42, 7, "Buy milk", T);

        let messages = RoutingTable::default().route(&event).unwrap();

        assert_eq!(
            kinds(&messages),
            vec![
                (Channel::Email, "welcome_email"),
                (Channel::Push, "todo_created_push")
            ]
        );
        assert_eq!(
            serde_json::to_value(&messages[0].notification).unwrap(),
            json!({
                "type": "welcome_email",
                "userId": 42,
                "todoTitle": "Buy milk",
                "timestamp": T
            })
        );
        assert_eq!(
            serde_json::to_value(&messages[1].notification).unwrap(),
            json!({
                "type": "todo_created_push",
                "userId": 42,
                "title": "New Todo Created",
                "body": "\"Buy milk\" has been added to your list",
                "timestamp": T
            })
        );
    }

    #[test]
    fn single_route_event_types() {
        let table = RoutingTable::default();

        let completed = table.route(&Event::todo_completed(42, "Buy milk", T)).unwrap();
        assert_eq!(kinds(&completed), vec![(Channel::Push, "todo_completed_push")]);
        assert_eq!(
            completed[0].notification.push_content(),
            Some(("Todo Completed!", "Great job! You completed \"Buy milk\""))
        );

        let due = table
            .route(&Event::todo_due_soon(42, "Buy milk", "2024-01-02", T))
            .unwrap();
        assert_eq!(kinds(&due), vec![(Channel::Email, "due_reminder_email")]);

        let registered = table
            .route(&Event::user_registered(9, "alice", "a@x.com", T))
            .unwrap();
        assert_eq!(kinds(&registered), vec![(Channel::Email, "welcome_user_email")]);
    }

    #[test]
    fn unknown_types_route_nowhere() {
        let event = Event::decode(br#"{"type":"unknown_thing","userId":1}"#).unwrap();
        assert!(RoutingTable::default().route(&event).unwrap().is_empty());
    }

    #[test]
    fn missing_required_field_fails_the_whole_event() {
        let mut event = Event::todo_created(42, 7, "Buy milk", T);
        event.fields.remove("timestamp");

        let result = RoutingTable::default().route(&event);

        assert!(matches!(result, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn only_fields_the_routes_read_are_typed() {
        let mut event = Event::todo_completed(42, "Buy milk", T);
        event.fields.insert("email".to_string(), json!(7));
        event.fields.insert("userId".to_string(), json!(42.0));

        let messages = RoutingTable::default().route(&event).unwrap();

        assert_eq!(
            serde_json::to_value(&messages[0].notification).unwrap()["userId"],
            json!(42.0)
        );

        event.fields.insert("title".to_string(), json!(5));
        assert!(matches!(
            RoutingTable::default().route(&event),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn routing_is_a_pure_function_of_the_event() {
        let table = RoutingTable::default();
        let event = Event::todo_created(42, 7, "Buy milk", T);

        assert_eq!(table.route(&event).unwrap(), table.route(&event).unwrap());
    }

    #[test]
    fn new_event_types_need_only_a_table_row() {
        let mut table = RoutingTable::default();
        table.insert(
            "todo_reopened",
            vec![Route::new(Channel::Push, todo_completed_push)],
        );

        let mut event = Event::todo_completed("user-1", "Buy milk", T);
        event.event_type = "todo_reopened".to_string();

        assert_eq!(table.route(&event).unwrap().len(), 1);
    }
}
