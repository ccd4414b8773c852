use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::ClientResult;
use crate::headers::{response_message, Name, PrimitiveKind, RequestHeader, ResponseHeader};
use crate::net::{Connector, Transport};
use crate::partition::{self, Partition};
use crate::session::Session;

mod methods {
    pub const GET: &str = "/strata.counter.CounterService/Get";
    pub const SET: &str = "/strata.counter.CounterService/Set";
    pub const INCREMENT: &str = "/strata.counter.CounterService/Increment";
    pub const DECREMENT: &str = "/strata.counter.CounterService/Decrement";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub header: ResponseHeader,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    pub header: RequestHeader,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementRequest {
    pub header: RequestHeader,
    pub delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementResponse {
    pub header: ResponseHeader,
    pub next_value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecrementRequest {
    pub header: RequestHeader,
    pub delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecrementResponse {
    pub header: ResponseHeader,
    pub next_value: i64,
}

response_message!(GetResponse, SetResponse, IncrementResponse, DecrementResponse);

/// Distributed signed counter.
pub struct Counter<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> Counter<C> {
    pub async fn new(
        name: Name,
        partitions: &[Partition],
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let name = Name {
            kind: PrimitiveKind::Counter,
            ..name
        };
        let partition = partition::select(&name, partitions)?.clone();
        let session = Session::open(name, partition, connector, config).await?;
        Ok(Self { session })
    }

    pub fn name(&self) -> &Name {
        self.session.name()
    }

    pub async fn get(&self) -> ClientResult<i64> {
        let response: GetResponse = self
            .session
            .do_query(|transport, header| {
                let request = GetRequest { header };
                async move { transport.unary(methods::GET, request).await }
            })
            .await?;
        Ok(response.value)
    }

    pub async fn set(&self, value: i64) -> ClientResult<()> {
        let _: SetResponse = self
            .session
            .do_command(move |transport, header| {
                let request = SetRequest { header, value };
                async move { transport.unary(methods::SET, request).await }
            })
            .await?;
        Ok(())
    }

    /// Adds `delta` and returns the new value.
    pub async fn increment(&self, delta: i64) -> ClientResult<i64> {
        let response: IncrementResponse = self
            .session
            .do_command(move |transport, header| {
                let request = IncrementRequest { header, delta };
                async move { transport.unary(methods::INCREMENT, request).await }
            })
            .await?;
        Ok(response.next_value)
    }

    /// Subtracts `delta` and returns the new value.
    pub async fn decrement(&self, delta: i64) -> ClientResult<i64> {
        let response: DecrementResponse = self
            .session
            .do_command(move |transport, header| {
                let request = DecrementRequest { header, delta };
                async move { transport.unary(methods::DECREMENT, request).await }
            })
            .await?;
        Ok(response.next_value)
    }

    pub async fn close(mut self) -> ClientResult<()> {
        self.session.close().await
    }

    pub async fn delete(mut self) -> ClientResult<()> {
        self.session.delete().await
    }
}
