//! Reservation message construction.
//!
//! A trigger publishes one `reservation.created` message per configured
//! reservation id. The content comes from configuration only; nothing from the
//! incoming request is copied into a message.

use bytes::Bytes;
use queue_runtime::{Message, MessageId, QueueError, SerializationError};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(test)]
#[path = "reservation_tests.rs"]
mod tests;

/// Body of a reservation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCreated {
    #[serde(rename = "reservationid")]
    pub reservation_id: u64,
}

/// Builds the fixed set of reservation messages sent per trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationMessageFactory {
    reservation_ids: Vec<u64>,
}

impl ReservationMessageFactory {
    /// Value of the `message-type` property on every message
    pub const MESSAGE_TYPE: &'static str = "reservation.created";

    /// Name of the property carrying [`Self::MESSAGE_TYPE`]
    pub const MESSAGE_TYPE_PROPERTY: &'static str = "message-type";

    pub const CONTENT_TYPE: &'static str = "application/json";

    pub fn new(reservation_ids: Vec<u64>) -> Self {
        Self { reservation_ids }
    }

    pub fn reservation_ids(&self) -> &[u64] {
        &self.reservation_ids
    }

    /// Create one message per reservation id, in configuration order
    ///
    /// Every message gets a fresh message id, so two triggers never produce
    /// duplicate ids.
    pub fn create_messages(&self) -> Result<Vec<Message>, QueueError> {
        self.reservation_ids
            .iter()
            .map(|&reservation_id| {
                debug!(reservation_id, "Creating reservation message");
                Self::create_message(ReservationCreated { reservation_id })
            })
            .collect()
    }

    fn create_message(reservation: ReservationCreated) -> Result<Message, QueueError> {
        let body = serde_json::to_vec(&reservation).map_err(SerializationError::from)?;

        Ok(Message::new(Bytes::from(body))
            .with_message_id(MessageId::new())
            .with_content_type(Self::CONTENT_TYPE)
            .with_property(Self::MESSAGE_TYPE_PROPERTY, Self::MESSAGE_TYPE))
    }
}

impl Default for ReservationMessageFactory {
    fn default() -> Self {
        Self::new(vec![1])
    }
}
