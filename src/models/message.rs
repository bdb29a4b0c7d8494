use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use crate::{error::PipelineError, models::event::EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Push,
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Push => write!(f, "push"),
        }
    }
}

/// Payload of a derived message, as it travels on the email and push queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Notification {
    WelcomeEmail {
        user_id: EntityId,
        todo_title: String,
        timestamp: String,
    },
    TodoCreatedPush {
        user_id: EntityId,
        title: String,
        body: String,
        timestamp: String,
    },
    TodoCompletedPush {
        user_id: EntityId,
        title: String,
        body: String,
        timestamp: String,
    },
    DueReminderEmail {
        user_id: EntityId,
        todo_title: String,
        due_date: String,
        timestamp: String,
    },
    WelcomeUserEmail {
        user_id: EntityId,
        username: String,
        email: String,
        timestamp: String,
    },
}

impl Notification {
    pub fn decode(payload: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(payload)
            .map_err(|e| PipelineError::Decode(format!("Invalid notification payload: {}", e)))
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::WelcomeEmail { .. } => "welcome_email",
            Notification::TodoCreatedPush { .. } => "todo_created_push",
            Notification::TodoCompletedPush { .. } => "todo_completed_push",
            Notification::DueReminderEmail { .. } => "due_reminder_email",
            Notification::WelcomeUserEmail { .. } => "welcome_user_email",
        }
    }

    pub fn user_id(&self) -> &EntityId {
        match self {
            Notification::WelcomeEmail { user_id, .. }
            | Notification::TodoCreatedPush { user_id, .. }
            | Notification::TodoCompletedPush { user_id, .. }
            | Notification::DueReminderEmail { user_id, .. }
            | Notification::WelcomeUserEmail { user_id, .. } => user_id,
        }
    }

    /// Subject line for email notifications, `None` for push notifications.
    pub fn email_subject(&self) -> Option<String> {
        match self {
            Notification::WelcomeEmail { .. } => {
                Some("Your new todo has been created!".to_string())
            }
            Notification::DueReminderEmail { todo_title, .. } => {
                Some(format!("Reminder: \"{}\" is due soon", todo_title))
            }
            Notification::WelcomeUserEmail { username, .. } => {
                Some(format!("Welcome to Todo App, {}!", username))
            }
            Notification::TodoCreatedPush { .. } | Notification::TodoCompletedPush { .. } => None,
        }
    }

    /// Title and body for push notifications, `None` for emails.
    pub fn push_content(&self) -> Option<(&str, &str)> {
        match self {
            Notification::TodoCreatedPush { title, body, .. }
            | Notification::TodoCompletedPush { title, body, .. } => {
                Some((title.as_str(), body.as_str()))
            }
            _ => None,
        }
    }
}

/// A notification addressed to one downstream channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: Channel,
    pub notification: Notification,
}
