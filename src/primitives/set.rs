use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::ClientResult;
use crate::headers::{response_message, Name, PrimitiveKind, RequestHeader, ResponseHeader};
use crate::net::{Connector, Transport};
use crate::partition::{self, Partition};
use crate::session::{EventStream, Session};

mod methods {
    pub const ADD: &str = "/strata.set.SetService/Add";
    pub const REMOVE: &str = "/strata.set.SetService/Remove";
    pub const CONTAINS: &str = "/strata.set.SetService/Contains";
    pub const SIZE: &str = "/strata.set.SetService/Size";
    pub const CLEAR: &str = "/strata.set.SetService/Clear";
    pub const ITERATE: &str = "/strata.set.SetService/Iterate";
    pub const EVENTS: &str = "/strata.set.SetService/Events";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRequest {
    pub header: RequestHeader,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResponse {
    pub header: ResponseHeader,
    pub added: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub header: RequestHeader,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub header: ResponseHeader,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainsRequest {
    pub header: RequestHeader,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainsResponse {
    pub header: ResponseHeader,
    pub contains: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeResponse {
    pub header: ResponseHeader,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterateRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterateResponse {
    pub header: ResponseHeader,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Added,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub header: ResponseHeader,
    pub kind: EventType,
    pub value: String,
}

response_message!(
    AddResponse,
    RemoveResponse,
    ContainsResponse,
    SizeResponse,
    ClearResponse,
    IterateResponse,
    EventResponse,
);

/// A membership change observed through [`Set::watch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEvent {
    pub kind: EventType,
    pub value: String,
}

/// Distributed set of strings.
pub struct Set<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> Set<C> {
    pub async fn new(
        name: Name,
        partitions: &[Partition],
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let name = Name {
            kind: PrimitiveKind::Set,
            ..name
        };
        let partition = partition::select(&name, partitions)?.clone();
        let session = Session::open(name, partition, connector, config).await?;
        Ok(Self { session })
    }

    pub fn name(&self) -> &Name {
        self.session.name()
    }

    /// Returns true if the value was not already present.
    pub async fn add(&self, value: &str) -> ClientResult<bool> {
        let value = value.to_string();
        let response: AddResponse = self
            .session
            .do_command(move |transport, header| {
                let request = AddRequest {
                    header,
                    value: value.clone(),
                };
                async move { transport.unary(methods::ADD, request).await }
            })
            .await?;
        Ok(response.added)
    }

    /// Returns true if the value was present.
    pub async fn remove(&self, value: &str) -> ClientResult<bool> {
        let value = value.to_string();
        let response: RemoveResponse = self
            .session
            .do_command(move |transport, header| {
                let request = RemoveRequest {
                    header,
                    value: value.clone(),
                };
                async move { transport.unary(methods::REMOVE, request).await }
            })
            .await?;
        Ok(response.removed)
    }

    pub async fn contains(&self, value: &str) -> ClientResult<bool> {
        let value = value.to_string();
        let response: ContainsResponse = self
            .session
            .do_query(move |transport, header| {
                let request = ContainsRequest {
                    header,
                    value: value.clone(),
                };
                async move { transport.unary(methods::CONTAINS, request).await }
            })
            .await?;
        Ok(response.contains)
    }

    pub async fn len(&self) -> ClientResult<usize> {
        let response: SizeResponse = self
            .session
            .do_query(|transport, header| {
                let request = SizeRequest { header };
                async move { transport.unary(methods::SIZE, request).await }
            })
            .await?;
        Ok(response.size as usize)
    }

    pub async fn is_empty(&self) -> ClientResult<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn clear(&self) -> ClientResult<()> {
        let _: ClearResponse = self
            .session
            .do_command(|transport, header| {
                let request = ClearRequest { header };
                async move { transport.unary(methods::CLEAR, request).await }
            })
            .await?;
        Ok(())
    }

    /// Streams the current members; the stream closes after the last one.
    pub async fn iter(&self) -> ClientResult<EventStream<String>> {
        self.session
            .do_query_stream(
                |transport, header| {
                    let request = IterateRequest { header };
                    async move { transport.server_stream(methods::ITERATE, request).await }
                },
                |response: IterateResponse| Some(response.value),
            )
            .await
    }

    /// Streams membership changes until the watcher is dropped or the
    /// session ends.
    pub async fn watch(&self) -> ClientResult<EventStream<SetEvent>> {
        self.session
            .do_command_stream(
                |transport, header| {
                    let request = EventRequest { header };
                    async move { transport.server_stream(methods::EVENTS, request).await }
                },
                |response: EventResponse| {
                    Some(SetEvent {
                        kind: response.kind,
                        value: response.value,
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
