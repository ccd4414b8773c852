use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::ClientResult;
use crate::headers::{response_message, Name, PrimitiveKind, RequestHeader, ResponseHeader};
use crate::net::{Connector, Transport};
use crate::partition::{self, Partition};
use crate::session::{EventStream, Session};

mod methods {
    pub const APPEND: &str = "/strata.log.LogService/Append";
    pub const GET: &str = "/strata.log.LogService/Get";
    pub const FIRST: &str = "/strata.log.LogService/FirstRecord";
    pub const LAST: &str = "/strata.log.LogService/LastRecord";
    pub const SIZE: &str = "/strata.log.LogService/Size";
    pub const CLEAR: &str = "/strata.log.LogService/Clear";
    pub const EVENTS: &str = "/strata.log.LogService/Events";
}

/// One appended record and the index the server assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub index: u64,
    #[serde(default)]
    pub value: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub header: RequestHeader,
    pub value: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendResponse {
    pub header: ResponseHeader,
    pub index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub header: RequestHeader,
    #[serde(default)]
    pub index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub record: Option<Record>,
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
pub struct EventRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub header: ResponseHeader,
    pub record: Record,
}

response_message!(
    AppendResponse,
    RecordResponse,
    SizeResponse,
    ClearResponse,
    EventResponse,
);

/// Distributed append-only log.
pub struct Log<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> Log<C> {
    pub async fn new(
        name: Name,
        partitions: &[Partition],
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let name = Name {
            kind: PrimitiveKind::Log,
            ..name
        };
        let partition = partition::select(&name, partitions)?.clone();
        let session = Session::open(name, partition, connector, config).await?;
        Ok(Self { session })
    }

    pub fn name(&self) -> &Name {
        self.session.name()
    }

    /// Appends `value` and returns the record with its assigned index.
    pub async fn append(&self, value: Bytes) -> ClientResult<Record> {
        let stored = value.clone();
        let response: AppendResponse = self
            .session
            .do_command(move |transport, header| {
                let request = AppendRequest {
                    header,
                    value: value.clone(),
                };
                async move { transport.unary(methods::APPEND, request).await }
            })
            .await?;
        Ok(Record {
            index: response.index,
            value: stored,
        })
    }

    pub async fn get(&self, index: u64) -> ClientResult<Option<Record>> {
        self.record_query(methods::GET, index).await
    }

    pub async fn first_record(&self) -> ClientResult<Option<Record>> {
        self.record_query(methods::FIRST, 0).await
    }

    pub async fn last_record(&self) -> ClientResult<Option<Record>> {
        self.record_query(methods::LAST, 0).await
    }

    async fn record_query(&self, method: &'static str, index: u64) -> ClientResult<Option<Record>> {
        let response: RecordResponse = self
            .session
            .do_query(move |transport, header| {
                let request = GetRequest { header, index };
                async move { transport.unary(method, request).await }
            })
            .await?;
        Ok(response.record)
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

    /// Streams appended records until the watcher is dropped or the session
    /// ends.
    pub async fn watch(&self) -> ClientResult<EventStream<Record>> {
        self.session
            .do_command_stream(
                |transport, header| {
                    let request = EventRequest { header };
                    async move { transport.server_stream(methods::EVENTS, request).await }
                },
                |response: EventResponse| Some(response.record),
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
