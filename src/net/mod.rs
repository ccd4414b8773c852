pub mod grpc;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{ClientResult, RpcResult};

/// Network address of a partition endpoint (`host:port` or a full URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Address(s)
    }
}

/// Server-push response stream as produced by a transport.
pub type RpcStream<R> = Pin<Box<dyn Stream<Item = RpcResult<R>> + Send>>;

/// Bidirectional RPC channel to one endpoint.
///
/// Messages are plain serde types; the concrete transport decides the
/// framing (the gRPC implementation ships JSON bytes through a raw codec,
/// the test transport skips serialization entirely). Cloning must be cheap:
/// the session clones the transport once per dispatch attempt.
pub trait Transport: Clone + Send + Sync + 'static {
    fn unary<Req, Res>(
        &self,
        method: &'static str,
        request: Req,
    ) -> impl Future<Output = RpcResult<Res>> + Send
    where
        Req: Serialize + Send + 'static,
        Res: DeserializeOwned + Send + 'static;

    fn server_stream<Req, Res>(
        &self,
        method: &'static str,
        request: Req,
    ) -> impl Future<Output = RpcResult<RpcStream<Res>>> + Send
    where
        Req: Serialize + Send + 'static,
        Res: DeserializeOwned + Send + 'static;
}

/// Builds transports for endpoints. One connector is shared by a session's
/// pool; `connect` is called lazily and again after every retarget.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(
        &self,
        address: &Address,
    ) -> impl Future<Output = ClientResult<Self::Transport>> + Send;
}

struct ConnsInner<T> {
    address: Address,
    transport: Option<T>,
}

/// Connection pool for a single partition: one bound endpoint, one cached
/// transport. `reconnect` retargets the pool after a NOT_LEADER redirect and
/// invalidates the cache so the next `connect` rebuilds against the new
/// leader. The async mutex keeps a connect-in-progress and a concurrent
/// retarget from ever exposing a torn state.
pub struct Conns<C: Connector> {
    connector: C,
    inner: Mutex<ConnsInner<C::Transport>>,
}

impl<C: Connector> Conns<C> {
    pub fn new(connector: C, address: Address) -> Self {
        Self {
            connector,
            inner: Mutex::new(ConnsInner {
                address,
                transport: None,
            }),
        }
    }

    /// Returns the bound transport, establishing it on first use or after a
    /// `reconnect`.
    pub async fn connect(&self) -> ClientResult<C::Transport> {
        let mut inner = self.inner.lock().await;
        if let Some(transport) = &inner.transport {
            return Ok(transport.clone());
        }
        let transport = self.connector.connect(&inner.address).await?;
        inner.transport = Some(transport.clone());
        Ok(transport)
    }

    /// Rebinds the pool to `address` and drops the cached transport.
    pub async fn reconnect(&self, address: Address) {
        let mut inner = self.inner.lock().await;
        if inner.address != address {
            tracing::debug!(from = %inner.address, to = %address, "retargeting connection");
        }
        inner.address = address;
        inner.transport = None;
    }

    pub async fn address(&self) -> Address {
        self.inner.lock().await.address.clone()
    }
}
