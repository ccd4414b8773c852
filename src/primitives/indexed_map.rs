use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::ClientResult;
use crate::headers::{response_message, Name, PrimitiveKind, RequestHeader, ResponseHeader};
use crate::net::{Connector, Transport};
use crate::partition::{self, Partition};
use crate::primitives::map::EventType;
use crate::primitives::OpStatus;
use crate::session::{EventStream, Session};

mod methods {
    pub const PUT: &str = "/strata.indexedmap.IndexedMapService/Put";
    pub const GET: &str = "/strata.indexedmap.IndexedMapService/Get";
    pub const GET_INDEX: &str = "/strata.indexedmap.IndexedMapService/GetIndex";
    pub const FIRST: &str = "/strata.indexedmap.IndexedMapService/FirstEntry";
    pub const LAST: &str = "/strata.indexedmap.IndexedMapService/LastEntry";
    pub const NEXT: &str = "/strata.indexedmap.IndexedMapService/NextEntry";
    pub const PREV: &str = "/strata.indexedmap.IndexedMapService/PrevEntry";
    pub const REMOVE: &str = "/strata.indexedmap.IndexedMapService/Remove";
    pub const SIZE: &str = "/strata.indexedmap.IndexedMapService/Size";
    pub const CLEAR: &str = "/strata.indexedmap.IndexedMapService/Clear";
    pub const ENTRIES: &str = "/strata.indexedmap.IndexedMapService/Entries";
    pub const EVENTS: &str = "/strata.indexedmap.IndexedMapService/Events";
}

/// An entry pinned to the log index at which it was written. Indices are
/// dense per map and make the map iterable in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedEntry {
    pub index: u64,
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
    #[serde(default)]
    pub expect_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub status: OpStatus,
    pub index: u64,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub header: RequestHeader,
    /// Lookup by key when set; by `index` otherwise.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResponse {
    pub header: ResponseHeader,
    /// Absent when nothing matched.
    #[serde(default)]
    pub entry: Option<IndexedEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub header: RequestHeader,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub index: u64,
    #[serde(default)]
    pub expect_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub status: OpStatus,
    #[serde(default)]
    pub entry: Option<IndexedEntry>,
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
    pub entry: IndexedEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub header: ResponseHeader,
    pub kind: EventType,
    pub entry: IndexedEntry,
}

response_message!(
    PutResponse,
    EntryResponse,
    RemoveResponse,
    SizeResponse,
    ClearResponse,
    EntriesResponse,
    EventResponse,
);

/// A change observed through [`IndexedMap::watch`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedMapEvent {
    pub kind: EventType,
    pub entry: IndexedEntry,
}

/// Distributed map whose entries are addressable both by key and by the log
/// index of their first write.
pub struct IndexedMap<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> IndexedMap<C> {
    pub async fn new(
        name: Name,
        partitions: &[Partition],
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let name = Name {
            kind: PrimitiveKind::IndexedMap,
            ..name
        };
        let partition = partition::select(&name, partitions)?.clone();
        let session = Session::open(name, partition, connector, config).await?;
        Ok(Self { session })
    }

    pub fn name(&self) -> &Name {
        self.session.name()
    }

    /// Writes `key` and returns the entry with its index assigned.
    pub async fn put(&self, key: &str, value: Bytes) -> ClientResult<IndexedEntry> {
        self.put_inner(key, value, 0).await
    }

    pub async fn put_versioned(
        &self,
        key: &str,
        value: Bytes,
        expect_version: u64,
    ) -> ClientResult<IndexedEntry> {
        self.put_inner(key, value, expect_version).await
    }

    async fn put_inner(
        &self,
        key: &str,
        value: Bytes,
        expect_version: u64,
    ) -> ClientResult<IndexedEntry> {
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
        Ok(IndexedEntry {
            index: response.index,
            key: key.to_string(),
            value: stored,
            version: response.version,
        })
    }

    pub async fn get(&self, key: &str) -> ClientResult<Option<IndexedEntry>> {
        let key = Some(key.to_string());
        self.entry_query(methods::GET, key, 0).await
    }

    pub async fn get_index(&self, index: u64) -> ClientResult<Option<IndexedEntry>> {
        self.entry_query(methods::GET_INDEX, None, index).await
    }

    pub async fn first_entry(&self) -> ClientResult<Option<IndexedEntry>> {
        self.entry_query(methods::FIRST, None, 0).await
    }

    pub async fn last_entry(&self) -> ClientResult<Option<IndexedEntry>> {
        self.entry_query(methods::LAST, None, 0).await
    }

    /// The first entry with an index greater than `index`.
    pub async fn next_entry(&self, index: u64) -> ClientResult<Option<IndexedEntry>> {
        self.entry_query(methods::NEXT, None, index).await
    }

    /// The last entry with an index less than `index`.
    pub async fn prev_entry(&self, index: u64) -> ClientResult<Option<IndexedEntry>> {
        self.entry_query(methods::PREV, None, index).await
    }

    async fn entry_query(
        &self,
        method: &'static str,
        key: Option<String>,
        index: u64,
    ) -> ClientResult<Option<IndexedEntry>> {
        let response: EntryResponse = self
            .session
            .do_query(move |transport, header| {
                let request = GetRequest {
                    header,
                    key: key.clone(),
                    index,
                };
                async move { transport.unary(method, request).await }
            })
            .await?;
        Ok(response.entry)
    }

    pub async fn remove(&self, key: &str) -> ClientResult<Option<IndexedEntry>> {
        let key = Some(key.to_string());
        self.remove_inner(key, 0, 0).await
    }

    pub async fn remove_index(&self, index: u64) -> ClientResult<Option<IndexedEntry>> {
        self.remove_inner(None, index, 0).await
    }

    pub async fn remove_versioned(
        &self,
        key: &str,
        expect_version: u64,
    ) -> ClientResult<Option<IndexedEntry>> {
        let key = Some(key.to_string());
        self.remove_inner(key, 0, expect_version).await
    }

    async fn remove_inner(
        &self,
        key: Option<String>,
        index: u64,
        expect_version: u64,
    ) -> ClientResult<Option<IndexedEntry>> {
        let response: RemoveResponse = self
            .session
            .do_command(move |transport, header| {
                let request = RemoveRequest {
                    header,
                    key: key.clone(),
                    index,
                    expect_version,
                };
                async move { transport.unary(methods::REMOVE, request).await }
            })
            .await?;
        if response.status == OpStatus::Noop {
            return Ok(None);
        }
        response.status.check()?;
        Ok(response.entry)
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

    /// Streams the current entries in index order.
    pub async fn entries(&self) -> ClientResult<EventStream<IndexedEntry>> {
        self.session
            .do_query_stream(
                |transport, header| {
                    let request = EntriesRequest { header };
                    async move { transport.server_stream(methods::ENTRIES, request).await }
                },
                |response: EntriesResponse| Some(response.entry),
            )
            .await
    }

    /// Streams map changes until the watcher is dropped or the session ends.
    pub async fn watch(&self) -> ClientResult<EventStream<IndexedMapEvent>> {
        self.session
            .do_command_stream(
                |transport, header| {
                    let request = EventRequest { header };
                    async move { transport.server_stream(methods::EVENTS, request).await }
                },
                |response: EventResponse| {
                    Some(IndexedMapEvent {
                        kind: response.kind,
                        entry: response.entry,
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
