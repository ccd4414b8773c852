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
    pub const PUT: &str = "/strata.map.MapService/Put";
    pub const GET: &str = "/strata.map.MapService/Get";
    pub const REMOVE: &str = "/strata.map.MapService/Remove";
    pub const SIZE: &str = "/strata.map.MapService/Size";
    pub const CLEAR: &str = "/strata.map.MapService/Clear";
    pub const ENTRIES: &str = "/strata.map.MapService/Entries";
    pub const EVENTS: &str = "/strata.map.MapService/Events";
}

/// A key/value pair with the server-assigned version of its last write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    #[serde(default)]
    pub value: Bytes,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    pub header: RequestHeader,
    pub key: String,
    pub value: Bytes,
    /// Expected current version; 0 writes unconditionally.
    #[serde(default)]
    pub expect_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub status: OpStatus,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub header: RequestHeader,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub value: Bytes,
    /// 0 when the key is absent.
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub header: RequestHeader,
    pub key: String,
    #[serde(default)]
    pub expect_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub status: OpStatus,
    #[serde(default)]
    pub previous_value: Bytes,
    #[serde(default)]
    pub previous_version: u64,
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
pub struct EntriesRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntriesResponse {
    pub header: ResponseHeader,
    pub key: String,
    #[serde(default)]
    pub value: Bytes,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Inserted,
    Updated,
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
    pub key: String,
    #[serde(default)]
    pub value: Bytes,
    #[serde(default)]
    pub version: u64,
}

response_message!(
    PutResponse,
    GetResponse,
    RemoveResponse,
    SizeResponse,
    ClearResponse,
    EntriesResponse,
    EventResponse,
);

/// A change observed through [`Map::watch`].
#[derive(Debug, Clone, PartialEq)]
pub struct MapEvent {
    pub kind: EventType,
    pub entry: Entry,
}

/// Distributed key/value map with per-key versions.
pub struct Map<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> Map<C> {
    pub async fn new(
        name: Name,
        partitions: &[Partition],
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let name = Name {
            kind: PrimitiveKind::Map,
            ..name
        };
        let partition = partition::select(&name, partitions)?.clone();
        let session = Session::open(name, partition, connector, config).await?;
        Ok(Self { session })
    }

    pub fn name(&self) -> &Name {
        self.session.name()
    }

    /// Writes `key` unconditionally and returns the stored entry.
    pub async fn put(&self, key: &str, value: Bytes) -> ClientResult<Entry> {
        self.put_inner(key, value, 0).await
    }

    /// Writes `key` only if its current version equals `expect_version`.
    pub async fn put_versioned(
        &self,
        key: &str,
        value: Bytes,
        expect_version: u64,
    ) -> ClientResult<Entry> {
        self.put_inner(key, value, expect_version).await
    }

    async fn put_inner(&self, key: &str, value: Bytes, expect_version: u64) -> ClientResult<Entry> {
        let owned = key.to_string();
        let stored = value.clone();
        let response: PutResponse = self
            .session
            .do_command(move |transport, header| {
                let request = PutRequest {
                    header,
                    key: owned.clone(),
                    value: value.clone(),
                    expect_version,
                };
                async move { transport.unary(methods::PUT, request).await }
            })
            .await?;
        response.status.check()?;
        Ok(Entry {
            key: key.to_string(),
            value: stored,
            version: response.version,
        })
    }

    pub async fn get(&self, key: &str) -> ClientResult<Option<Entry>> {
        let owned = key.to_string();
        let response: GetResponse = self
            .session
            .do_query(move |transport, header| {
                let request = GetRequest {
                    header,
                    key: owned.clone(),
                };
                async move { transport.unary(methods::GET, request).await }
            })
            .await?;
        if response.version == 0 {
            return Ok(None);
        }
        Ok(Some(Entry {
            key: key.to_string(),
            value: response.value,
            version: response.version,
        }))
    }

    /// Removes `key`, returning the removed entry if it existed.
    pub async fn remove(&self, key: &str) -> ClientResult<Option<Entry>> {
        self.remove_inner(key, 0).await
    }

    /// Removes `key` only if its current version equals `expect_version`.
    pub async fn remove_versioned(
        &self,
        key: &str,
        expect_version: u64,
    ) -> ClientResult<Option<Entry>> {
        self.remove_inner(key, expect_version).await
    }

    async fn remove_inner(&self, key: &str, expect_version: u64) -> ClientResult<Option<Entry>> {
        let owned = key.to_string();
        let response: RemoveResponse = self
            .session
            .do_command(move |transport, header| {
                let request = RemoveRequest {
                    header,
                    key: owned.clone(),
                    expect_version,
                };
                async move { transport.unary(methods::REMOVE, request).await }
            })
            .await?;
        if response.status == OpStatus::Noop {
            return Ok(None);
        }
        response.status.check()?;
        Ok(Some(Entry {
            key: key.to_string(),
            value: response.previous_value,
            version: response.previous_version,
        }))
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

    /// Streams the current entries; the stream closes after the last one.
    pub async fn entries(&self) -> ClientResult<EventStream<Entry>> {
        self.session
            .do_query_stream(
                |transport, header| {
                    let request = EntriesRequest { header };
                    async move { transport.server_stream(methods::ENTRIES, request).await }
                },
                |response: EntriesResponse| {
                    Some(Entry {
                        key: response.key,
                        value: response.value,
                        version: response.version,
                    })
                },
            )
            .await
    }

    /// Streams map changes until the watcher is dropped or the session ends.
    pub async fn watch(&self) -> ClientResult<EventStream<MapEvent>> {
        self.session
            .do_command_stream(
                |transport, header| {
                    let request = EventRequest { header };
                    async move { transport.server_stream(methods::EVENTS, request).await }
                },
                |response: EventResponse| {
                    Some(MapEvent {
                        kind: response.kind,
                        entry: Entry {
                            key: response.key,
                            value: response.value,
                            version: response.version,
                        },
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
