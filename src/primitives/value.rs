use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::ClientResult;
use crate::headers::{response_message, Name, PrimitiveKind, RequestHeader, ResponseHeader};
use crate::net::{Connector, Transport};
use crate::partition::{self, Partition};
use crate::primitives::OpStatus;
use crate::session::{EventStream, Session};

mod methods {
    pub const GET: &str = "/strata.value.ValueService/Get";
    pub const SET: &str = "/strata.value.ValueService/Set";
    pub const EVENTS: &str = "/strata.value.ValueService/Events";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub value: Bytes,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    pub header: RequestHeader,
    pub value: Bytes,
    /// Expected current version; 0 writes unconditionally.
    #[serde(default)]
    pub expect_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub status: OpStatus,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub value: Bytes,
    #[serde(default)]
    pub version: u64,
}

response_message!(GetResponse, SetResponse, EventResponse);

/// A versioned value change observed through [`Value::watch`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEvent {
    pub value: Bytes,
    pub version: u64,
}

/// Distributed versioned register.
pub struct Value<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> Value<C> {
    pub async fn new(
        name: Name,
        partitions: &[Partition],
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let name = Name {
            kind: PrimitiveKind::Value,
            ..name
        };
        let partition = partition::select(&name, partitions)?.clone();
        let session = Session::open(name, partition, connector, config).await?;
        Ok(Self { session })
    }

    pub fn name(&self) -> &Name {
        self.session.name()
    }

    /// Returns the current value and its version (version 0 = never set).
    pub async fn get(&self) -> ClientResult<(Bytes, u64)> {
        let response: GetResponse = self
            .session
            .do_query(|transport, header| {
                let request = GetRequest { header };
                async move { transport.unary(methods::GET, request).await }
            })
            .await?;
        Ok((response.value, response.version))
    }

    /// Writes unconditionally and returns the new version.
    pub async fn set(&self, value: Bytes) -> ClientResult<u64> {
        self.set_inner(value, 0).await
    }

    /// Writes only if the current version equals `expect_version`.
    pub async fn set_versioned(&self, value: Bytes, expect_version: u64) -> ClientResult<u64> {
        self.set_inner(value, expect_version).await
    }

    async fn set_inner(&self, value: Bytes, expect_version: u64) -> ClientResult<u64> {
        let response: SetResponse = self
            .session
            .do_command(move |transport, header| {
                let request = SetRequest {
                    header,
                    value: value.clone(),
                    expect_version,
                };
                async move { transport.unary(methods::SET, request).await }
            })
            .await?;
        response.status.check()?;
        Ok(response.version)
    }

    /// Streams value changes until the watcher is dropped or the session
    /// ends.
    pub async fn watch(&self) -> ClientResult<EventStream<ValueEvent>> {
        self.session
            .do_command_stream(
                |transport, header| {
                    let request = EventRequest { header };
                    async move { transport.server_stream(methods::EVENTS, request).await }
                },
                |response: EventResponse| {
                    Some(ValueEvent {
                        value: response.value,
                        version: response.version,
                    })
                },
            )
            .await
    }

    pub async fn close(mut self) -> ClientResult<()> {
        self.session.close().await
    }

    pub async fn delete(mut self) -> ClientResult<()> {
        self.session.delete().await
    }
}
