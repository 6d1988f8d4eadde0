//! # Summary
//!
//! Defines the ballot/operation/message types shared by every role, and the
//! wire codec that turns a [`Message`] into the flat, self-describing JSON
//! record described by the transport contract: every field is present on
//! every message, with `null` standing in for a field the message's kind
//! doesn't use.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Size of the band each proposer's ballots occupy. Large enough that no
/// proposer exhausts its band of local counters in one run.
pub const BALLOT_BAND: u64 = 1_000_000;

/// A totally ordered, per-proposer-unique proposal number. Composed as
/// `ordinal * BALLOT_BAND + counter`; monotone non-decreasing within one
/// proposer and disjoint across proposers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ballot(u64);

impl Ballot {
    pub fn new(ordinal: u64, counter: u64) -> Self {
        Ballot(ordinal * BALLOT_BAND + counter)
    }

    /// Constructs a ballot from its raw numeric value. Used by tests and by
    /// the wire codec, which has no notion of ordinal/counter once decoded.
    pub fn from_raw(value: u64) -> Self {
        Ballot(value)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque value whose equality is well-defined. The protocol never
/// inspects an operation's contents, only compares, clones, and serializes
/// it. Blanket-implemented, mirroring the teacher's `state::Identifier`
/// pattern.
pub trait Operation:
    Clone + fmt::Debug + Eq + std::hash::Hash + Serialize + serde::de::DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Operation for T where
    T: Clone + fmt::Debug + Eq + std::hash::Hash + Serialize + serde::de::DeserializeOwned + Send + Sync + 'static
{
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "PREPARE")]
    Prepare,
    #[serde(rename = "PROMISE")]
    Promise,
    #[serde(rename = "ACCEPT")]
    Accept,
    #[serde(rename = "LEARN")]
    Learn,
    #[serde(rename = "NACK")]
    Nack,
}

/// The five Paxos message kinds, with only the fields each kind actually
/// carries. This is the type role code matches on; [`WireMessage`] is the
/// flat form that actually crosses the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message<O> {
    Prepare {
        timestamp: Ballot,
        sender_id: String,
        receiver_id: String,
    },
    Promise {
        timestamp: Ballot,
        sender_id: String,
        receiver_id: String,
        accepted_timestamp: Option<Ballot>,
        accepted_operation: Option<O>,
    },
    Accept {
        timestamp: Ballot,
        sender_id: String,
        receiver_id: String,
        operation: O,
    },
    Learn {
        timestamp: Ballot,
        sender_id: String,
        receiver_id: String,
        operation: O,
    },
    Nack {
        timestamp: Ballot,
        sender_id: String,
        receiver_id: String,
    },
}

impl<O> Message<O> {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Prepare { .. } => MessageKind::Prepare,
            Message::Promise { .. } => MessageKind::Promise,
            Message::Accept { .. } => MessageKind::Accept,
            Message::Learn { .. } => MessageKind::Learn,
            Message::Nack { .. } => MessageKind::Nack,
        }
    }

    pub fn timestamp(&self) -> Ballot {
        match *self {
            Message::Prepare { timestamp, .. }
            | Message::Promise { timestamp, .. }
            | Message::Accept { timestamp, .. }
            | Message::Learn { timestamp, .. }
            | Message::Nack { timestamp, .. } => timestamp,
        }
    }

    pub fn sender_id(&self) -> &str {
        match self {
            Message::Prepare { sender_id, .. }
            | Message::Promise { sender_id, .. }
            | Message::Accept { sender_id, .. }
            | Message::Learn { sender_id, .. }
            | Message::Nack { sender_id, .. } => sender_id,
        }
    }

    pub fn receiver_id(&self) -> &str {
        match self {
            Message::Prepare { receiver_id, .. }
            | Message::Promise { receiver_id, .. }
            | Message::Accept { receiver_id, .. }
            | Message::Learn { receiver_id, .. }
            | Message::Nack { receiver_id, .. } => receiver_id,
        }
    }
}

impl<O: fmt::Debug> fmt::Display for Message<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Prepare { timestamp, .. } => write!(f, "PREPARE <{timestamp}>"),
            Message::Promise {
                timestamp,
                accepted_timestamp,
                accepted_operation,
                ..
            } => match (accepted_timestamp, accepted_operation) {
                (Some(ab), Some(ao)) => write!(f, "<{ab}, {ao:?}>"),
                _ => write!(f, "PROMISE <{timestamp}>"),
            },
            Message::Accept { timestamp, operation, .. } => write!(f, "ACCEPT <{timestamp}, {operation:?}>"),
            Message::Learn { operation, .. } => write!(f, "LEARN <{operation:?}>"),
            Message::Nack { timestamp, .. } => write!(f, "NACK <{timestamp}>"),
        }
    }
}

/// Flat, self-describing wire record. Every field is present on every
/// message; fields a kind doesn't use serialize as JSON `null`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireMessage<O> {
    pub msg_type: MessageKind,
    pub timestamp: Ballot,
    pub sender_id: String,
    pub receiver_id: String,
    pub operation: Option<O>,
    pub accepted_timestamp: Option<Ballot>,
    pub accepted_operation: Option<O>,
}

impl<O> From<Message<O>> for WireMessage<O> {
    fn from(message: Message<O>) -> Self {
        let kind = message.kind();
        match message {
            Message::Prepare { timestamp, sender_id, receiver_id } => WireMessage {
                msg_type: kind,
                timestamp,
                sender_id,
                receiver_id,
                operation: None,
                accepted_timestamp: None,
                accepted_operation: None,
            },
            Message::Promise {
                timestamp,
                sender_id,
                receiver_id,
                accepted_timestamp,
                accepted_operation,
            } => WireMessage {
                msg_type: kind,
                timestamp,
                sender_id,
                receiver_id,
                operation: None,
                accepted_timestamp,
                accepted_operation,
            },
            Message::Accept { timestamp, sender_id, receiver_id, operation } => WireMessage {
                msg_type: kind,
                timestamp,
                sender_id,
                receiver_id,
                operation: Some(operation),
                accepted_timestamp: None,
                accepted_operation: None,
            },
            Message::Learn { timestamp, sender_id, receiver_id, operation } => WireMessage {
                msg_type: kind,
                timestamp,
                sender_id,
                receiver_id,
                operation: Some(operation),
                accepted_timestamp: None,
                accepted_operation: None,
            },
            Message::Nack { timestamp, sender_id, receiver_id } => WireMessage {
                msg_type: kind,
                timestamp,
                sender_id,
                receiver_id,
                operation: None,
                accepted_timestamp: None,
                accepted_operation: None,
            },
        }
    }
}

impl<O> TryFrom<WireMessage<O>> for Message<O> {
    type Error = CodecError;

    fn try_from(wire: WireMessage<O>) -> Result<Self, CodecError> {
        let missing = |field| CodecError::MissingField { kind: wire_kind_name(wire.msg_type), field };
        Ok(match wire.msg_type {
            MessageKind::Prepare => Message::Prepare {
                timestamp: wire.timestamp,
                sender_id: wire.sender_id,
                receiver_id: wire.receiver_id,
            },
            MessageKind::Promise => {
                let (accepted_timestamp, accepted_operation) = match (wire.accepted_timestamp, wire.accepted_operation) {
                    (Some(ballot), Some(operation)) => (Some(ballot), Some(operation)),
                    (None, None) => (None, None),
                    (Some(_), None) => return Err(missing("accepted_operation")),
                    (None, Some(_)) => return Err(missing("accepted_timestamp")),
                };
                Message::Promise {
                    timestamp: wire.timestamp,
                    sender_id: wire.sender_id,
                    receiver_id: wire.receiver_id,
                    accepted_timestamp,
                    accepted_operation,
                }
            }
            MessageKind::Accept => Message::Accept {
                timestamp: wire.timestamp,
                sender_id: wire.sender_id,
                receiver_id: wire.receiver_id,
                operation: wire.operation.ok_or_else(|| missing("operation"))?,
            },
            MessageKind::Learn => Message::Learn {
                timestamp: wire.timestamp,
                sender_id: wire.sender_id,
                receiver_id: wire.receiver_id,
                operation: wire.operation.ok_or_else(|| missing("operation"))?,
            },
            MessageKind::Nack => Message::Nack {
                timestamp: wire.timestamp,
                sender_id: wire.sender_id,
                receiver_id: wire.receiver_id,
            },
        })
    }
}

fn wire_kind_name(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Prepare => "PREPARE",
        MessageKind::Promise => "PROMISE",
        MessageKind::Accept => "ACCEPT",
        MessageKind::Learn => "LEARN",
        MessageKind::Nack => "NACK",
    }
}

/// Encodes a message as a JSON datagram payload.
pub fn encode<O: Operation>(message: Message<O>) -> Result<Vec<u8>, CodecError> {
    let wire: WireMessage<O> = message.into();
    Ok(serde_json::to_vec(&wire)?)
}

/// Decodes a JSON datagram payload into a message. Rejects an unrecognized
/// `msg_type` (via `WireMessage`'s `MessageKind` deserialization failing)
/// and a recognized kind missing a required field.
pub fn decode<O: Operation>(bytes: &[u8]) -> Result<Message<O>, CodecError> {
    let wire: WireMessage<O> = serde_json::from_slice(bytes).map_err(|err| {
        // serde_json reports an unknown enum variant as a generic data
        // error; surface it as UnknownKind when it looks like the tag.
        if err.to_string().contains("unknown variant") {
            CodecError::UnknownKind(err.to_string())
        } else {
            CodecError::Json(err)
        }
    })?;
    Message::try_from(wire)
}
