/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */


use std::fmt;
use std::time::Duration;

use crate::common::NodeId;

/// Errors surfaced to reply handlers and by fallible bus operations.
///
/// Every variant maps to a numeric failure code (see [`BusError::code`]);
/// codes below zero are reserved for the bus, so applications calling
/// [`Message::fail`](crate::message::Message::fail) should use positive codes.
#[derive(Debug, Clone, PartialEq)]
pub enum BusError {
    /// No handler was registered for the topic when the send was dispatched.
    NoHandlers {
        /// The topic that had no handlers.
        topic: String,
    },
    /// The recipient failed the message, or its handler panicked before answering.
    HandlerFailure {
        /// Application-defined failure code, or [`BusError::HANDLER_PANIC`].
        code: i32,
        /// Human-readable reason supplied by the recipient.
        message: String,
    },
    /// No reply arrived within the deadline chosen by the timeout policy.
    DeliveryTimeout {
        /// The topic of the request that timed out.
        topic: String,
        /// How long the bus waited.
        after: Duration,
    },
    /// The message could not be handed to, or was lost by, a remote node.
    Transport {
        /// The node the message was addressed to.
        node: NodeId,
        /// What went wrong.
        reason: String,
    },
    /// The topic was empty.
    InvalidTopic,
    /// The payload could not be converted to or from JSON.
    Serialization(String),
    /// The bus has been shut down.
    Closed,
    /// A cluster frame could not be encoded or decoded.
    Codec(String),
}

impl BusError {
    /// Failure code for [`BusError::NoHandlers`].
    pub const NO_HANDLERS: i32 = -1;
    /// Failure code for [`BusError::DeliveryTimeout`].
    pub const TIMEOUT: i32 = -2;
    /// Failure code for [`BusError::Transport`].
    pub const TRANSPORT: i32 = -3;
    /// Failure code reported when a handler panics before replying.
    pub const HANDLER_PANIC: i32 = -4;
    /// Failure code for [`BusError::Closed`].
    pub const CLOSED: i32 = -5;
    /// Failure code for [`BusError::InvalidTopic`].
    pub const INVALID_TOPIC: i32 = -6;
    /// Failure code for [`BusError::Serialization`].
    pub const SERIALIZATION: i32 = -7;
    /// Failure code for [`BusError::Codec`].
    pub const CODEC: i32 = -8;

    /// Returns the numeric failure code of this error.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::NoHandlers { .. } => Self::NO_HANDLERS,
            Self::HandlerFailure { code, .. } => *code,
            Self::DeliveryTimeout { .. } => Self::TIMEOUT,
            Self::Transport { .. } => Self::TRANSPORT,
            Self::InvalidTopic => Self::INVALID_TOPIC,
            Self::Serialization(_) => Self::SERIALIZATION,
            Self::Closed => Self::CLOSED,
            Self::Codec(_) => Self::CODEC,
        }
    }

    /// Returns the human-readable failure message.
    ///
    /// For [`BusError::HandlerFailure`] this is exactly the text passed to
    /// `fail`; other variants render their `Display` form.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::HandlerFailure { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Crate-internal: the `(code, detail)` pair carried by a failure frame.
    pub(crate) fn to_wire(&self) -> (i32, String) {
        match self {
            Self::NoHandlers { topic } => (Self::NO_HANDLERS, topic.clone()),
            other => (other.code(), other.message()),
        }
    }

    /// Crate-internal: rebuilds an error from a failure frame.
    pub(crate) fn from_wire(code: i32, detail: String) -> Self {
        match code {
            Self::NO_HANDLERS => Self::NoHandlers { topic: detail },
            Self::CLOSED => Self::Closed,
            _ => Self::HandlerFailure {
                code,
                message: detail,
            },
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHandlers { topic } => write!(f, "no handlers for topic '{topic}'"),
            Self::HandlerFailure { code, message } => {
                write!(f, "handler failed with code {code}: {message}")
            }
            Self::DeliveryTimeout { topic, after } => {
                write!(f, "no reply for topic '{topic}' within {after:?}")
            }
            Self::Transport { node, reason } => {
                write!(f, "transport error towards node {node}: {reason}")
            }
            Self::InvalidTopic => write!(f, "topic must not be empty"),
            Self::Serialization(msg) => write!(f, "payload serialization failed: {msg}"),
            Self::Closed => write!(f, "bus is shut down"),
            Self::Codec(msg) => write!(f, "frame codec error: {msg}"),
        }
    }
}

impl std::error::Error for BusError {}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<TransportError> for BusError {
    fn from(err: TransportError) -> Self {
        Self::Transport {
            node: err.node,
            reason: err.reason,
        }
    }
}

/// Error reported by [`ClusterTransport`](crate::traits::ClusterTransport)
/// implementations.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct TransportError {
    /// The node the operation was addressed to.
    #[new(into)]
    pub node: NodeId,
    /// What went wrong.
    #[new(into)]
    pub reason: String,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport failure for node {}: {}", self.node, self.reason)
    }
}

impl std::error::Error for TransportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_reserved_table() {
        assert_eq!(BusError::NoHandlers { topic: "t".into() }.code(), -1);
        assert_eq!(
            BusError::DeliveryTimeout {
                topic: "t".into(),
                after: Duration::from_millis(5)
            }
            .code(),
            -2
        );
        assert_eq!(
            BusError::Transport {
                node: NodeId::new("n"),
                reason: "gone".into()
            }
            .code(),
            -3
        );
        assert_eq!(BusError::Closed.code(), -5);
        assert_eq!(
            BusError::HandlerFailure {
                code: 42,
                message: "nope".into()
            }
            .code(),
            42
        );
    }

    #[test]
    fn handler_failure_message_is_verbatim() {
        let err = BusError::HandlerFailure {
            code: 7,
            message: "out of stock".into(),
        };
        assert_eq!(err.message(), "out of stock");
        assert_eq!(err.to_string(), "handler failed with code 7: out of stock");
    }

    #[test]
    fn wire_form_preserves_no_handlers_topic() {
        let (code, detail) = BusError::NoHandlers {
            topic: "orders".into(),
        }
        .to_wire();
        assert_eq!(
            BusError::from_wire(code, detail),
            BusError::NoHandlers {
                topic: "orders".into()
            }
        );
    }

    #[test]
    fn unknown_wire_codes_become_handler_failures() {
        assert_eq!(
            BusError::from_wire(BusError::HANDLER_PANIC, "boom".into()),
            BusError::HandlerFailure {
                code: BusError::HANDLER_PANIC,
                message: "boom".into()
            }
        );
    }

    #[test]
    fn transport_errors_convert() {
        let err: BusError = TransportError::new("peer", "connection reset").into();
        assert_eq!(err.code(), BusError::TRANSPORT);
        assert!(err.to_string().contains("peer"));
    }
}
