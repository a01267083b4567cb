//! Fire-and-forget domain events emitted after successful registration and login.
//!
//! Publishing never blocks the request path: events go into a bounded channel
//! and are dropped with a warning when it is full or closed.

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::entity::user;

pub const USER_REGISTERED: &str = "user.registered";
pub const USER_LOGGED_IN: &str = "user.logged_in";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuthEvent {
    #[serde(skip)]
    pub topic: &'static str,
    pub user_id: String,
    pub email: String,
}

impl AuthEvent {
    pub fn user_registered(user: &user::Model) -> Self {
        Self::new(USER_REGISTERED, user)
    }

    pub fn user_logged_in(user: &user::Model) -> Self {
        Self::new(USER_LOGGED_IN, user)
    }

    fn new(topic: &'static str, user: &user::Model) -> Self {
        Self {
            topic,
            user_id: user.id.clone(),
            email: user.email.clone(),
        }
    }
}

pub trait EventPublisher: Send + Sync {
    /// Must return immediately.
    fn publish(&self, event: AuthEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: AuthEvent) {}
}

/// Hands events to a bounded channel drained by a separate task.
#[derive(Clone, Debug)]
pub struct ChannelEventPublisher {
    tx: mpsc::Sender<AuthEvent>,
}

impl ChannelEventPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuthEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: AuthEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(topic = event.topic, user_id = %event.user_id, "Event channel full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                warn!(topic = event.topic, user_id = %event.user_id, "Event channel closed, dropping event");
            }
        }
    }
}

/// Drains published events into structured log lines until every sender is gone.
pub fn spawn_event_log_sink(mut rx: mpsc::Receiver<AuthEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = serde_json::to_string(&event).unwrap_or_default();
            info!(topic = event.topic, %payload, "Domain event");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::user::Role;
    use time::OffsetDateTime;

    fn user() -> user::Model {
        let now = OffsetDateTime::now_utc();
        user::Model {
            id: "u-1".into(),
            email: "bob@example.com".into(),
            username: "bob".into(),
            password_hash: String::new(),
            first_name: None,
            last_name: None,
            role: Role::Seller,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn channel_delivers_in_order() {
        let (publisher, mut rx) = ChannelEventPublisher::new(4);
        publisher.publish(AuthEvent::user_registered(&user()));
        publisher.publish(AuthEvent::user_logged_in(&user()));

        assert_eq!(rx.recv().await.unwrap().topic, USER_REGISTERED);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.topic, USER_LOGGED_IN);
        assert_eq!(second.email, "bob@example.com");
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (publisher, mut rx) = ChannelEventPublisher::new(1);
        publisher.publish(AuthEvent::user_registered(&user()));
        publisher.publish(AuthEvent::user_logged_in(&user()));

        assert_eq!(rx.recv().await.unwrap().topic, USER_REGISTERED);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (publisher, rx) = ChannelEventPublisher::new(1);
        drop(rx);
        publisher.publish(AuthEvent::user_registered(&user()));
    }

    #[test]
    fn payload_is_user_id_and_email() {
        let json = serde_json::to_value(AuthEvent::user_registered(&user())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"user_id": "u-1", "email": "bob@example.com"})
        );
    }
}
