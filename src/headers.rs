use serde::{Deserialize, Serialize};

use crate::net::Address;

/// Primitive type tag carried in the name tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Counter,
    Value,
    Map,
    IndexedMap,
    Set,
    List,
    Log,
    Lock,
    Election,
}

impl PrimitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Value => "value",
            Self::Map => "map",
            Self::IndexedMap => "indexed-map",
            Self::Set => "set",
            Self::List => "list",
            Self::Log => "log",
            Self::Lock => "lock",
            Self::Election => "election",
        }
    }
}

/// Full identity of a primitive on the server: (namespace, scope, kind, name).
/// Only the `name` component seeds partition selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    pub namespace: String,
    pub scope: String,
    pub kind: PrimitiveKind,
    pub name: String,
}

impl Name {
    pub fn new(
        namespace: impl Into<String>,
        scope: impl Into<String>,
        kind: PrimitiveKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            scope: scope.into(),
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.namespace,
            self.scope,
            self.kind.as_str(),
            self.name
        )
    }
}

/// Header attached to every outbound RPC.
///
/// For commands `request_id` is the freshly assigned write sequence number;
/// for queries it carries the session's `response_id` watermark instead, so
/// the server can hold the query until all prior writes from this session
/// have been applied. `streams` is populated only on keepalives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,
    pub partition: u32,
    pub session_id: u64,
    pub index: u64,
    pub request_id: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamHeader>,
}

/// Header attached to every inbound response or stream frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeader {
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub kind: ResponseType,
    pub session_id: u64,
    pub index: u64,
    #[serde(default)]
    pub request_id: u64,
    #[serde(default)]
    pub response_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<Address>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    #[default]
    Ok,
    NotLeader,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    OpenStream,
    CloseStream,
    #[default]
    Response,
}

/// Per-stream progress advertised back to the server on keepalives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub stream_id: u64,
    pub response_id: u64,
}

/// Access to the response header embedded in a decoded response message.
/// The dispatch loop interprets status and sequencing metadata through this
/// trait before handing the message back to the caller.
pub trait ResponseMessage {
    fn header(&self) -> &ResponseHeader;
}

macro_rules! response_message {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl crate::headers::ResponseMessage for $ty {
                fn header(&self) -> &crate::headers::ResponseHeader {
                    &self.header
                }
            }
        )+
    };
}

pub(crate) use response_message;
