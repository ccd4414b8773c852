mod stream;
mod streaming;

pub use stream::{StreamRecord, StreamRegistry};
pub use streaming::EventStream;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::{ClientError, ClientResult, RpcError, RpcResult};
use crate::headers::{
    response_message, Name, RequestHeader, ResponseHeader, ResponseMessage, ResponseStatus,
};
use crate::net::{Connector, Conns, Transport};
use crate::partition::Partition;
use crate::utils::backoff::{Backoff, RetryConfig};

pub mod methods {
    pub const OPEN_SESSION: &str = "/strata.session.SessionService/OpenSession";
    pub const KEEP_ALIVE: &str = "/strata.session.SessionService/KeepAlive";
    pub const CLOSE_SESSION: &str = "/strata.session.SessionService/CloseSession";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSessionRequest {
    pub header: RequestHeader,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSessionResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveResponse {
    pub header: ResponseHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSessionRequest {
    pub header: RequestHeader,
    #[serde(default)]
    pub delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSessionResponse {
    pub header: ResponseHeader,
}

response_message!(
    OpenSessionResponse,
    KeepAliveResponse,
    CloseSessionResponse,
);

/// Sequence fields and the stream registry, all behind one read-biased lock.
#[derive(Debug, Default)]
struct SequenceState {
    session_id: u64,
    last_index: u64,
    request_id: u64,
    response_id: u64,
    streams: StreamRegistry,
}

/// Lock-guarded session state shared between the dispatch loop, the
/// keepalive task, stream reader tasks, and stream guards.
#[derive(Debug)]
pub(crate) struct SessionShared {
    name: Name,
    partition_id: u32,
    timeout: Duration,
    client_id: String,
    state: RwLock<SequenceState>,
}

impl SessionShared {
    /// Write header: assigns the next `request_id` under the write lock.
    fn command_header(&self) -> RequestHeader {
        let mut state = self.state.write();
        state.request_id += 1;
        RequestHeader {
            name: Some(self.name.clone()),
            partition: self.partition_id,
            session_id: state.session_id,
            index: state.last_index,
            request_id: state.request_id,
            streams: Vec::new(),
        }
    }

    /// Read header: `index` asks the server to wait for at least
    /// `last_index`, `request_id` carries the `response_id` watermark so the
    /// query observes every prior write from this session.
    fn query_header(&self) -> RequestHeader {
        let state = self.state.read();
        RequestHeader {
            name: Some(self.name.clone()),
            partition: self.partition_id,
            session_id: state.session_id,
            index: state.last_index,
            request_id: state.response_id,
            streams: Vec::new(),
        }
    }

    /// Like a command header, and additionally registers a stream record
    /// under the freshly assigned `request_id`.
    fn stream_header(&self) -> (Arc<StreamRecord>, RequestHeader) {
        let mut state = self.state.write();
        state.request_id += 1;
        let stream_id = state.request_id;
        let record = state.streams.register(stream_id);
        let header = RequestHeader {
            name: Some(self.name.clone()),
            partition: self.partition_id,
            session_id: state.session_id,
            index: state.last_index,
            request_id: stream_id,
            streams: Vec::new(),
        };
        (record, header)
    }

    /// Header for session-level control RPCs: no primitive name, and the
    /// stream headers the server uses to release buffered frames.
    fn state_header(&self) -> RequestHeader {
        let state = self.state.read();
        RequestHeader {
            name: None,
            partition: self.partition_id,
            session_id: state.session_id,
            index: state.last_index,
            request_id: state.response_id,
            streams: state.streams.snapshot(state.response_id),
        }
    }

    /// Folds an OK response header into the session state.
    ///
    /// Double-checked: the common case where the server index has not
    /// advanced takes only the read lock.
    pub(crate) fn record_response(&self, request: &RequestHeader, response: &ResponseHeader) {
        {
            let state = self.state.read();
            if response.index <= state.last_index {
                return;
            }
        }
        let mut state = self.state.write();
        if response.session_id > state.session_id {
            state.session_id = response.session_id;
            state.last_index = response.session_id;
        }
        if request.request_id > state.response_id {
            state.response_id = request.request_id;
        }
        if response.index > state.last_index {
            state.last_index = response.index;
        }
    }

    pub(crate) fn close_stream(&self, stream_id: u64) {
        self.state.write().streams.remove(stream_id);
    }
}

/// Dispatch state shared with background tasks: the sequence fields plus the
/// connection pool and retry policy.
pub(crate) struct SessionCore<C: Connector> {
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) conns: Conns<C>,
    retry: RetryConfig,
}

impl<C: Connector> SessionCore<C> {
    /// Runs one dispatch to completion: NOT_LEADER redirects retarget the
    /// pool and retry immediately with the same header (the server sees the
    /// same `request_id` and may deduplicate); transport failures retry
    /// under backoff until the budget is spent.
    pub(crate) async fn do_request<F, Fut, R>(
        &self,
        request: RequestHeader,
        mut call: F,
    ) -> ClientResult<R>
    where
        F: FnMut(C::Transport, RequestHeader) -> Fut + Send,
        Fut: Future<Output = RpcResult<R>> + Send,
        R: ResponseMessage + Send,
    {
        let mut backoff = Backoff::new(self.retry.clone());
        loop {
            let transport = match self.conns.connect().await {
                Ok(transport) => transport,
                Err(err) => {
                    if backoff.exhausted() {
                        return Err(ClientError::Unavailable(format!("{err}")));
                    }
                    let delay = backoff.next_delay();
                    tracing::debug!(error = %err, ?delay, "connect failed, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            match call(transport, request.clone()).await {
                Ok(response) => match response.header().status {
                    ResponseStatus::Ok => {
                        self.shared.record_response(&request, response.header());
                        return Ok(response);
                    }
                    ResponseStatus::NotLeader => {
                        let Some(leader) = response.header().leader.clone() else {
                            if backoff.exhausted() {
                                return Err(ClientError::Unavailable(
                                    "redirected without a leader hint".to_string(),
                                ));
                            }
                            tokio::time::sleep(backoff.next_delay()).await;
                            continue;
                        };
                        tracing::debug!(%leader, request_id = request.request_id, "redirected to leader");
                        self.conns.reconnect(leader).await;
                        backoff.on_success();
                    }
                    ResponseStatus::Error => return Err(ClientError::Unknown),
                },
                Err(RpcError::Canceled) => return Err(ClientError::Canceled),
                Err(RpcError::Transport(err)) => {
                    if backoff.exhausted() {
                        return Err(ClientError::Unavailable(format!("{err:#}")));
                    }
                    let delay = backoff.next_delay();
                    tracing::debug!(error = %err, ?delay, "rpc failed, backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub(crate) async fn do_command<F, Fut, R>(&self, call: F) -> ClientResult<R>
    where
        F: FnMut(C::Transport, RequestHeader) -> Fut + Send,
        Fut: Future<Output = RpcResult<R>> + Send,
        R: ResponseMessage + Send,
    {
        self.do_request(self.shared.command_header(), call).await
    }

    pub(crate) async fn do_query<F, Fut, R>(&self, call: F) -> ClientResult<R>
    where
        F: FnMut(C::Transport, RequestHeader) -> Fut + Send,
        Fut: Future<Output = RpcResult<R>> + Send,
        R: ResponseMessage + Send,
    {
        self.do_request(self.shared.query_header(), call).await
    }

    async fn keep_alive(&self) -> ClientResult<()> {
        let header = self.shared.state_header();
        let _: KeepAliveResponse = self
            .do_request(header, |transport, header| {
                let request = KeepAliveRequest { header };
                async move { transport.unary(methods::KEEP_ALIVE, request).await }
            })
            .await?;
        Ok(())
    }
}

async fn keepalive_loop<C: Connector>(core: Arc<SessionCore<C>>) {
    let mut ticker = tokio::time::interval(core.shared.timeout / 2);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval fires immediately; the first tick is not a keepalive
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(err) = core.keep_alive().await {
            tracing::warn!(error = %err, "keepalive failed");
        }
    }
}

/// Linearizability context for one primitive on one partition.
///
/// A session owns its sequence state, its connection pool, and a keepalive
/// task that fires every `timeout / 2` until the session is closed or
/// dropped.
pub struct Session<C: Connector> {
    core: Arc<SessionCore<C>>,
    keepalive: tokio::task::JoinHandle<()>,
    closed: bool,
}

impl<C: Connector> Session<C> {
    /// Opens a session for `name` on `partition` and starts keepalives.
    pub async fn open(
        name: Name,
        partition: Partition,
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let timeout = config.timeout();
        let shared = Arc::new(SessionShared {
            name,
            partition_id: partition.id,
            timeout,
            client_id: config.client_id(),
            state: RwLock::new(SequenceState::default()),
        });
        let core = Arc::new(SessionCore {
            shared,
            conns: Conns::new(connector, partition.address),
            retry: config.retry.clone(),
        });

        let header = core.shared.state_header();
        let timeout_ms = timeout.as_millis() as u64;
        let _: OpenSessionResponse = core
            .do_request(header, |transport, header| {
                let request = OpenSessionRequest { header, timeout_ms };
                async move { transport.unary(methods::OPEN_SESSION, request).await }
            })
            .await?;

        let keepalive = tokio::spawn(keepalive_loop(core.clone()));
        Ok(Self {
            core,
            keepalive,
            closed: false,
        })
    }

    pub fn name(&self) -> &Name {
        &self.core.shared.name
    }

    pub fn partition_id(&self) -> u32 {
        self.core.shared.partition_id
    }

    /// Client-chosen identity string, used e.g. as the election candidate id.
    pub fn client_id(&self) -> &str {
        &self.core.shared.client_id
    }

    pub fn session_id(&self) -> u64 {
        self.core.shared.state.read().session_id
    }

    pub fn last_index(&self) -> u64 {
        self.core.shared.state.read().last_index
    }

    pub fn request_id(&self) -> u64 {
        self.core.shared.state.read().request_id
    }

    pub fn response_id(&self) -> u64 {
        self.core.shared.state.read().response_id
    }

    pub(crate) fn core(&self) -> &Arc<SessionCore<C>> {
        &self.core
    }

    /// Dispatches a write. The closure is handed a transport and the
    /// command header and may be re-invoked on redirect or transport
    /// failure; the header (and so the `request_id`) is identical across
    /// attempts.
    pub async fn do_command<F, Fut, R>(&self, call: F) -> ClientResult<R>
    where
        F: FnMut(C::Transport, RequestHeader) -> Fut + Send,
        Fut: Future<Output = RpcResult<R>> + Send,
        R: ResponseMessage + Send,
    {
        self.core.do_command(call).await
    }

    /// Dispatches a read carrying the session's index and `response_id`
    /// watermark, so it observes every prior write from this session.
    pub async fn do_query<F, Fut, R>(&self, call: F) -> ClientResult<R>
    where
        F: FnMut(C::Transport, RequestHeader) -> Fut + Send,
        Fut: Future<Output = RpcResult<R>> + Send,
        R: ResponseMessage + Send,
    {
        self.core.do_query(call).await
    }

    /// Closes the session. The keepalive task stops before CloseSession goes
    /// out; local state is considered destroyed even if the RPC fails.
    pub async fn close(&mut self) -> ClientResult<()> {
        self.shutdown(false).await
    }

    /// Like [`close`](Self::close), and additionally asks the server to
    /// remove the primitive's state.
    pub async fn delete(&mut self) -> ClientResult<()> {
        self.shutdown(true).await
    }

    async fn shutdown(&mut self, delete: bool) -> ClientResult<()> {
        if self.closed {
            return Err(ClientError::InvalidArgument(
                "session already closed".to_string(),
            ));
        }
        self.closed = true;
        self.keepalive.abort();

        let header = self.core.shared.state_header();
        let _: CloseSessionResponse = self
            .core
            .do_request(header, move |transport, header| {
                let request = CloseSessionRequest { header, delete };
                async move { transport.unary(methods::CLOSE_SESSION, request).await }
            })
            .await?;
        Ok(())
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        self.keepalive.abort();
    }
}
