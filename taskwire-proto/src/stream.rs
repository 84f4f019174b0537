//! Frames exchanged on the subscription stream.
//!
//! The gateway speaks JSON text frames over WebSocket so that browser
//! dashboards can subscribe without a custom codec. Clients send
//! [`ClientFrame`]s, the gateway answers with [`ServerFrame`]s. Event frames
//! carry the same task/notification schema as the corresponding query types.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::notification::Notification;
use crate::task::{Task, TaskId};

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("frame serialization error: {0}")]
    Serialization(String),
}

/// Payload of an event frame, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A full task snapshot, published on `task-created:` and `task-updated:`.
    Task {
        /// The task after the mutation.
        task: Task,
    },
    /// A deletion tombstone, published on `task-deleted:`.
    TaskDeleted {
        /// Id of the removed task.
        task_id: TaskId,
    },
    /// A notification, published on `notification:`.
    Notification {
        /// The freshly created notification.
        notification: Notification,
    },
}

/// Frames sent by a client on the subscription stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Register interest in a topic.
    Subscribe {
        /// Topic string, e.g. `task-created:t-1`.
        topic: String,
    },
    /// Drop interest in a topic. Idempotent.
    Unsubscribe {
        /// Topic string previously subscribed.
        topic: String,
    },
}

/// Frames sent by the gateway on the subscription stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Acknowledges a subscribe.
    Subscribed {
        /// The topic that is now active.
        topic: String,
    },
    /// Acknowledges an unsubscribe.
    Unsubscribed {
        /// The topic that is no longer active.
        topic: String,
    },
    /// An event delivered on a subscribed topic.
    Event {
        /// Topic the event was published on.
        topic: String,
        /// Event payload, same schema as the query types.
        event: EventPayload,
    },
    /// An error. Only `UNAUTHENTICATED` terminates the stream; any other
    /// kind leaves the session usable.
    Error {
        /// Stable error kind.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },
}

/// Encodes a [`ServerFrame`] into a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the frame cannot be serialized.
pub fn encode_server(frame: &ServerFrame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerFrame`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the text cannot be deserialized.
pub fn decode_server(text: &str) -> Result<ServerFrame, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ClientFrame`] into a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the frame cannot be serialized.
pub fn encode_client(frame: &ClientFrame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientFrame`] from a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the text cannot be deserialized.
pub fn decode_client(text: &str) -> Result<ClientFrame, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}
