use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::{ClientError, ClientResult};
use crate::headers::{response_message, Name, PrimitiveKind, RequestHeader, ResponseHeader};
use crate::net::{Connector, Transport};
use crate::partition::{self, Partition};
use crate::primitives::OpStatus;
use crate::session::{EventStream, Session};

mod methods {
    pub const APPEND: &str = "/strata.list.ListService/Append";
    pub const INSERT: &str = "/strata.list.ListService/Insert";
    pub const SET: &str = "/strata.list.ListService/Set";
    pub const GET: &str = "/strata.list.ListService/Get";
    pub const REMOVE: &str = "/strata.list.ListService/Remove";
    pub const SIZE: &str = "/strata.list.ListService/Size";
    pub const CLEAR: &str = "/strata.list.ListService/Clear";
    pub const ITEMS: &str = "/strata.list.ListService/Items";
    pub const EVENTS: &str = "/strata.list.ListService/Events";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub header: RequestHeader,
    pub value: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    pub header: RequestHeader,
    pub index: u64,
    pub value: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub status: OpStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    pub header: RequestHeader,
    pub index: u64,
    pub value: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub status: OpStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub header: RequestHeader,
    pub index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub status: OpStatus,
    #[serde(default)]
    pub value: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub header: RequestHeader,
    pub index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub status: OpStatus,
    #[serde(default)]
    pub value: Bytes,
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
pub struct ItemsRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse {
    pub header: ResponseHeader,
    pub value: Bytes,
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
    pub index: u64,
    #[serde(default)]
    pub value: Bytes,
}

response_message!(
    AppendResponse,
    InsertResponse,
    SetResponse,
    GetResponse,
    RemoveResponse,
    SizeResponse,
    ClearResponse,
    ItemsResponse,
    EventResponse,
);

/// A positional change observed through [`List::watch`].
#[derive(Debug, Clone, PartialEq)]
pub struct ListEvent {
    pub kind: EventType,
    pub index: u64,
    pub value: Bytes,
}

/// Distributed list of byte values.
pub struct List<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> List<C> {
    pub async fn new(
        name: Name,
        partitions: &[Partition],
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let name = Name {
            kind: PrimitiveKind::List,
            ..name
        };
        let partition = partition::select(&name, partitions)?.clone();
        let session = Session::open(name, partition, connector, config).await?;
        Ok(Self { session })
    }

    pub fn name(&self) -> &Name {
        self.session.name()
    }

    pub async fn append(&self, value: Bytes) -> ClientResult<()> {
        let _: AppendResponse = self
            .session
            .do_command(move |transport, header| {
                let request = AppendRequest {
                    header,
                    value: value.clone(),
                };
                async move { transport.unary(methods::APPEND, request).await }
            })
            .await?;
        Ok(())
    }

    pub async fn insert(&self, index: usize, value: Bytes) -> ClientResult<()> {
        let response: InsertResponse = self
            .session
            .do_command(move |transport, header| {
                let request = InsertRequest {
                    header,
                    index: index as u64,
                    value: value.clone(),
                };
                async move { transport.unary(methods::INSERT, request).await }
            })
            .await?;
        response.status.check()
    }

    pub async fn set(&self, index: usize, value: Bytes) -> ClientResult<()> {
        let response: SetResponse = self
            .session
            .do_command(move |transport, header| {
                let request = SetRequest {
                    header,
                    index: index as u64,
                    value: value.clone(),
                };
                async move { transport.unary(methods::SET, request).await }
            })
            .await?;
        response.status.check()
    }

    pub async fn get(&self, index: usize) -> ClientResult<Bytes> {
        let response: GetResponse = self
            .session
            .do_query(move |transport, header| {
                let request = GetRequest {
                    header,
                    index: index as u64,
                };
                async move { transport.unary(methods::GET, request).await }
            })
            .await?;
        response.status.check()?;
        Ok(response.value)
    }

    /// Removes and returns the value at `index`.
    pub async fn remove(&self, index: usize) -> ClientResult<Bytes> {
        let response: RemoveResponse = self
            .session
            .do_command(move |transport, header| {
                let request = RemoveRequest {
                    header,
                    index: index as u64,
                };
                async move { transport.unary(methods::REMOVE, request).await }
            })
            .await?;
        response.status.check()?;
        Ok(response.value)
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

    /// Streams the current items in order; the stream closes after the last.
    pub async fn items(&self) -> ClientResult<EventStream<Bytes>> {
        self.session
            .do_query_stream(
                |transport, header| {
                    let request = ItemsRequest { header };
                    async move { transport.server_stream(methods::ITEMS, request).await }
                },
                |response: ItemsResponse| Some(response.value),
            )
            .await
    }

    /// Streams list changes until the watcher is dropped or the session
    /// ends.
    pub async fn watch(&self) -> ClientResult<EventStream<ListEvent>> {
        self.session
            .do_command_stream(
                |transport, header| {
                    let request = EventRequest { header };
                    async move { transport.server_stream(methods::EVENTS, request).await }
                },
                |response: EventResponse| {
                    Some(ListEvent {
                        kind: response.kind,
                        index: response.index,
                        value: response.value,
                    })
                },
            )
            .await
    }

    /// A bounds-checked view of `[from, to)`.
    pub fn slice(&self, from: usize, to: usize) -> ClientResult<ListSlice<'_, C>> {
        if to < from {
            return Err(ClientError::InvalidArgument(format!(
                "slice range inverted: {from}..{to}"
            )));
        }
        Ok(ListSlice {
            list: self,
            from,
            to: Some(to),
        })
    }

    /// A view of the list from `from` to its end.
    pub fn slice_from(&self, from: usize) -> ListSlice<'_, C> {
        ListSlice {
            list: self,
            from,
            to: None,
        }
    }

    /// A view of the list up to (but excluding) `to`.
    pub fn slice_to(&self, to: usize) -> ListSlice<'_, C> {
        ListSlice {
            list: self,
            from: 0,
            to: Some(to),
        }
    }

    pub async fn close(mut self) -> ClientResult<()> {
        self.session.close().await
    }

    pub async fn delete(mut self) -> ClientResult<()> {
        self.session.delete().await
    }
}

/// A window into a [`List`]; indices are relative to `from` and validated
/// before any RPC is issued.
pub struct ListSlice<'a, C: Connector> {
    list: &'a List<C>,
    from: usize,
    to: Option<usize>,
}

impl<C: Connector> ListSlice<'_, C> {
    fn resolve(&self, index: usize) -> ClientResult<usize> {
        let absolute = self.from + index;
        if let Some(to) = self.to {
            if absolute >= to {
                return Err(ClientError::InvalidArgument(format!(
                    "index {index} out of slice bounds {}..{to}",
                    self.from
                )));
            }
        }
        Ok(absolute)
    }

    pub async fn get(&self, index: usize) -> ClientResult<Bytes> {
        self.list.get(self.resolve(index)?).await
    }

    pub async fn set(&self, index: usize, value: Bytes) -> ClientResult<()> {
        self.list.set(self.resolve(index)?, value).await
    }

    pub async fn len(&self) -> ClientResult<usize> {
        let total = self.list.len().await?;
        let upper = self.to.map_or(total, |to| to.min(total));
        Ok(upper.saturating_sub(self.from))
    }

    pub async fn is_empty(&self) -> ClientResult<bool> {
        Ok(self.len().await? == 0)
    }
}
