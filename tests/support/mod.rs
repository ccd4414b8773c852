//! Scripted in-process transport for driving a session without a server.
//!
//! Handlers receive the target address, the method path, and the request as
//! a JSON value, and script the response; every call is recorded so tests
//! can assert on the exact headers that went over the wire.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use anyhow::anyhow;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use strata_client::error::{ClientResult, RpcError, RpcResult};
use strata_client::headers::{ResponseHeader, ResponseStatus, ResponseType};
use strata_client::net::{Address, Connector, RpcStream, Transport};

pub type UnaryHandler =
    dyn Fn(&Address, &'static str, &Value) -> RpcResult<Value> + Send + Sync + 'static;
pub type StreamHandler =
    dyn Fn(&Address, &'static str, &Value) -> RpcResult<RpcStream<Value>> + Send + Sync + 'static;

pub struct MockInner {
    unary: Box<UnaryHandler>,
    stream: Box<StreamHandler>,
    calls: Mutex<Vec<(Address, &'static str, Value)>>,
    dials: AtomicUsize,
}

/// Connector whose transports all talk to the same scripted handlers.
#[derive(Clone)]
pub struct MockConnector {
    inner: Arc<MockInner>,
}

impl MockConnector {
    pub fn new<U>(unary: U) -> Self
    where
        U: Fn(&Address, &'static str, &Value) -> RpcResult<Value> + Send + Sync + 'static,
    {
        Self::with_streams(unary, |_, method, _| {
            Err(RpcError::Transport(anyhow!("no stream handler for {method}")))
        })
    }

    pub fn with_streams<U, S>(unary: U, stream: S) -> Self
    where
        U: Fn(&Address, &'static str, &Value) -> RpcResult<Value> + Send + Sync + 'static,
        S: Fn(&Address, &'static str, &Value) -> RpcResult<RpcStream<Value>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            inner: Arc::new(MockInner {
                unary: Box::new(unary),
                stream: Box::new(stream),
                calls: Mutex::new(Vec::new()),
                dials: AtomicUsize::new(0),
            }),
        }
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<(Address, &'static str, Value)> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Recorded calls to one method.
    pub fn calls_to(&self, method: &'static str) -> Vec<(Address, Value)> {
        self.calls()
            .into_iter()
            .filter(|(_, m, _)| *m == method)
            .map(|(addr, _, value)| (addr, value))
            .collect()
    }

    pub fn dials(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(
        &self,
        address: &Address,
    ) -> impl Future<Output = ClientResult<Self::Transport>> + Send {
        self.inner.dials.fetch_add(1, Ordering::SeqCst);
        let transport = MockTransport {
            address: address.clone(),
            inner: self.inner.clone(),
        };
        async move { Ok(transport) }
    }
}

#[derive(Clone)]
pub struct MockTransport {
    address: Address,
    inner: Arc<MockInner>,
}

impl Transport for MockTransport {
    fn unary<Req, Res>(
        &self,
        method: &'static str,
        request: Req,
    ) -> impl Future<Output = RpcResult<Res>> + Send
    where
        Req: Serialize + Send + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        let value = serde_json::to_value(&request).expect("serializable request");
        self.inner
            .calls
            .lock()
            .unwrap()
            .push((self.address.clone(), method, value.clone()));
        let result = (self.inner.unary)(&self.address, method, &value);
        async move {
            result.and_then(|v| {
                serde_json::from_value(v).map_err(|e| RpcError::Transport(anyhow!(e)))
            })
        }
    }

    fn server_stream<Req, Res>(
        &self,
        method: &'static str,
        request: Req,
    ) -> impl Future<Output = RpcResult<RpcStream<Res>>> + Send
    where
        Req: Serialize + Send + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        let value = serde_json::to_value(&request).expect("serializable request");
        self.inner
            .calls
            .lock()
            .unwrap()
            .push((self.address.clone(), method, value.clone()));
        let result = (self.inner.stream)(&self.address, method, &value);
        async move {
            result.map(|stream| {
                Box::pin(stream.map(|item| {
                    item.and_then(|v| {
                        serde_json::from_value(v).map_err(|e| RpcError::Transport(anyhow!(e)))
                    })
                })) as RpcStream<Res>
            })
        }
    }
}

/// OK response header with the given identity and index.
pub fn ok_header(session_id: u64, index: u64) -> ResponseHeader {
    ResponseHeader {
        status: ResponseStatus::Ok,
        kind: ResponseType::Response,
        session_id,
        index,
        ..ResponseHeader::default()
    }
}

/// Stream frame header of the given type and in-stream response id.
pub fn stream_header(
    kind: ResponseType,
    session_id: u64,
    index: u64,
    response_id: u64,
) -> ResponseHeader {
    ResponseHeader {
        status: ResponseStatus::Ok,
        kind,
        session_id,
        index,
        response_id,
        ..ResponseHeader::default()
    }
}

pub fn to_value<T: Serialize>(message: &T) -> Value {
    serde_json::to_value(message).expect("serializable message")
}

/// A stream of pre-scripted frames followed by end-of-stream.
pub fn scripted_stream(frames: Vec<Value>) -> RpcStream<Value> {
    Box::pin(futures::stream::iter(frames.into_iter().map(Ok)))
}

/// A stream that never yields; dropping it flips `dropped`, which is how
/// tests observe that the client abandoned the server-side RPC.
pub struct PendingStream {
    dropped: Arc<std::sync::atomic::AtomicBool>,
}

impl PendingStream {
    pub fn new(dropped: Arc<std::sync::atomic::AtomicBool>) -> Self {
        Self { dropped }
    }
}

impl Stream for PendingStream {
    type Item = RpcResult<Value>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Pending
    }
}

impl Drop for PendingStream {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}
