use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::error::{ClientError, ClientResult, RpcResult};
use crate::headers::{RequestHeader, ResponseMessage, ResponseStatus, ResponseType};
use crate::net::{Connector, RpcStream};
use crate::session::stream::StreamRecord;
use crate::session::{Session, SessionCore, SessionShared};

/// How long the opening call waits for the server's OPEN_STREAM.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

const EVENT_BUFFER: usize = 128;

/// Decoded server-push events, delivered in the order the server assigned.
/// End of data is observed as channel closure; a command-stream's registry
/// record is released when the stream is dropped.
pub struct EventStream<E> {
    events: mpsc::Receiver<E>,
    _guard: Option<StreamGuard>,
}

impl<E> std::fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl<E> EventStream<E> {
    fn new(events: mpsc::Receiver<E>, guard: Option<StreamGuard>) -> Self {
        Self {
            events,
            _guard: guard,
        }
    }

    /// Receives the next event; `None` once the server closed the stream or
    /// it failed (check with a subsequent call on the primitive).
    pub async fn recv(&mut self) -> Option<E> {
        self.events.recv().await
    }
}

impl<E> Stream for EventStream<E> {
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

/// Removes the stream record when the consumer goes away, so the next
/// keepalive stops advertising the stream. Holds the shared state, not the
/// session, to keep the reference one-directional.
struct StreamGuard {
    shared: Arc<SessionShared>,
    stream_id: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.shared.close_stream(self.stream_id);
    }
}

impl<C: Connector> SessionCore<C> {
    /// Opens a command-stream: allocates a stream header (registering the
    /// record), issues the opening RPC, and pumps a reader task until
    /// CLOSE_STREAM. Synchronous up to the first in-sequence OPEN_STREAM or
    /// the handshake timeout.
    pub(crate) async fn do_command_stream<F, Fut, R, D, E>(
        self: &Arc<Self>,
        mut open: F,
        decode: D,
    ) -> ClientResult<EventStream<E>>
    where
        F: FnMut(C::Transport, RequestHeader) -> Fut + Send + 'static,
        Fut: Future<Output = RpcResult<RpcStream<R>>> + Send + 'static,
        R: ResponseMessage + Send + 'static,
        D: Fn(R) -> Option<E> + Send + 'static,
        E: Send + 'static,
    {
        let transport = self.conns.connect().await?;
        let (record, header) = self.shared.stream_header();

        let responses = match open(transport, header.clone()).await {
            Ok(responses) => responses,
            Err(err) => {
                self.shared.close_stream(record.id());
                return Err(err.into());
            }
        };

        let (handshake_tx, handshake_rx) = oneshot::channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(command_stream_reader(
            self.clone(),
            open,
            responses,
            record.clone(),
            header,
            handshake_tx,
            event_tx,
            decode,
        ));

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake_rx).await {
            Ok(Ok(())) => {
                let guard = StreamGuard {
                    shared: self.shared.clone(),
                    stream_id: record.id(),
                };
                Ok(EventStream::new(event_rx, Some(guard)))
            }
            // reader terminated before the handshake
            Ok(Err(_)) => {
                self.shared.close_stream(record.id());
                Err(ClientError::Unknown)
            }
            Err(_) => {
                reader.abort();
                self.shared.close_stream(record.id());
                Err(ClientError::Timeout)
            }
        }
    }

    /// Opens a query-stream: a read header, the opening RPC, and a reader
    /// task. No registry record is involved; the handshake fires on the
    /// first OPEN_STREAM unconditionally.
    pub(crate) async fn do_query_stream<F, Fut, R, D, E>(
        self: &Arc<Self>,
        mut open: F,
        decode: D,
    ) -> ClientResult<EventStream<E>>
    where
        F: FnMut(C::Transport, RequestHeader) -> Fut + Send + 'static,
        Fut: Future<Output = RpcResult<RpcStream<R>>> + Send + 'static,
        R: ResponseMessage + Send + 'static,
        D: Fn(R) -> Option<E> + Send + 'static,
        E: Send + 'static,
    {
        let transport = self.conns.connect().await?;
        let header = self.shared.query_header();

        let responses = open(transport, header.clone()).await.map_err(ClientError::from)?;

        let (handshake_tx, handshake_rx) = oneshot::channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(query_stream_reader(
            self.clone(),
            open,
            responses,
            header,
            handshake_tx,
            event_tx,
            decode,
        ));

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake_rx).await {
            Ok(Ok(())) => Ok(EventStream::new(event_rx, None)),
            Ok(Err(_)) => Err(ClientError::Unknown),
            Err(_) => {
                reader.abort();
                Err(ClientError::Timeout)
            }
        }
    }
}

async fn command_stream_reader<C, F, Fut, R, D, E>(
    core: Arc<SessionCore<C>>,
    mut open: F,
    mut responses: RpcStream<R>,
    record: Arc<StreamRecord>,
    header: RequestHeader,
    handshake: oneshot::Sender<()>,
    events: mpsc::Sender<E>,
    decode: D,
) where
    C: Connector,
    F: FnMut(C::Transport, RequestHeader) -> Fut + Send,
    Fut: Future<Output = RpcResult<RpcStream<R>>> + Send,
    R: ResponseMessage + Send,
    D: Fn(R) -> Option<E> + Send,
    E: Send,
{
    let mut handshake = Some(handshake);
    loop {
        let Some(item) = responses.next().await else {
            // server went away without CLOSE_STREAM
            break;
        };
        let response = match item {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(stream_id = record.id(), error = %err, "stream read failed");
                break;
            }
        };
        let rh = response.header().clone();
        match rh.kind {
            ResponseType::OpenStream => {
                if record.advance(rh.response_id) {
                    if let Some(tx) = handshake.take() {
                        let _ = tx.send(());
                    }
                }
            }
            ResponseType::CloseStream => {
                if record.advance(rh.response_id) {
                    break;
                }
            }
            ResponseType::Response => match rh.status {
                ResponseStatus::Ok => {
                    core.shared.record_response(&header, &rh);
                    // out-of-sequence frames are dropped silently
                    if record.advance(rh.response_id) {
                        if let Some(event) = decode(response) {
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                ResponseStatus::NotLeader => {
                    let Some(leader) = rh.leader else { break };
                    core.conns.reconnect(leader).await;
                    // release the old server stream before redialing so two
                    // readers never write to one channel
                    drop(std::mem::replace(
                        &mut responses,
                        Box::pin(futures::stream::empty()),
                    ));
                    match reopen(&core, &mut open, &header).await {
                        Some(next) => responses = next,
                        None => break,
                    }
                }
                ResponseStatus::Error => break,
            },
        }
    }
    core.shared.close_stream(record.id());
}

async fn query_stream_reader<C, F, Fut, R, D, E>(
    core: Arc<SessionCore<C>>,
    mut open: F,
    mut responses: RpcStream<R>,
    header: RequestHeader,
    handshake: oneshot::Sender<()>,
    events: mpsc::Sender<E>,
    decode: D,
) where
    C: Connector,
    F: FnMut(C::Transport, RequestHeader) -> Fut + Send,
    Fut: Future<Output = RpcResult<RpcStream<R>>> + Send,
    R: ResponseMessage + Send,
    D: Fn(R) -> Option<E> + Send,
    E: Send,
{
    let mut handshake = Some(handshake);
    loop {
        let Some(item) = responses.next().await else {
            break;
        };
        let response = match item {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "stream read failed");
                break;
            }
        };
        let rh = response.header().clone();
        match rh.kind {
            ResponseType::OpenStream => {
                if let Some(tx) = handshake.take() {
                    let _ = tx.send(());
                }
            }
            ResponseType::CloseStream => break,
            ResponseType::Response => match rh.status {
                ResponseStatus::Ok => {
                    core.shared.record_response(&header, &rh);
                    if let Some(event) = decode(response) {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                ResponseStatus::NotLeader => {
                    let Some(leader) = rh.leader else { break };
                    core.conns.reconnect(leader).await;
                    drop(std::mem::replace(
                        &mut responses,
                        Box::pin(futures::stream::empty()),
                    ));
                    match reopen(&core, &mut open, &header).await {
                        Some(next) => responses = next,
                        None => break,
                    }
                }
                ResponseStatus::Error => break,
            },
        }
    }
}

/// One reconnect attempt after a redirect; on failure the reader shuts the
/// stream down, like any other terminal stream error.
async fn reopen<C, F, Fut, R>(
    core: &Arc<SessionCore<C>>,
    open: &mut F,
    header: &RequestHeader,
) -> Option<RpcStream<R>>
where
    C: Connector,
    F: FnMut(C::Transport, RequestHeader) -> Fut + Send,
    Fut: Future<Output = RpcResult<RpcStream<R>>> + Send,
    R: ResponseMessage + Send,
{
    let transport = match core.conns.connect().await {
        Ok(transport) => transport,
        Err(err) => {
            tracing::debug!(error = %err, "reconnect after redirect failed");
            return None;
        }
    };
    match open(transport, header.clone()).await {
        Ok(responses) => Some(responses),
        Err(err) => {
            tracing::debug!(error = %err, "reopening stream after redirect failed");
            None
        }
    }
}

impl<C: Connector> Session<C> {
    /// Opens a command-stream: `open` issues the streaming RPC, `decode`
    /// turns accepted response messages into events. Returns once the
    /// server's OPEN_STREAM arrives, or fails with `Timeout` after the
    /// handshake window.
    pub async fn do_command_stream<F, Fut, R, D, E>(
        &self,
        open: F,
        decode: D,
    ) -> ClientResult<EventStream<E>>
    where
        F: FnMut(C::Transport, RequestHeader) -> Fut + Send + 'static,
        Fut: Future<Output = RpcResult<RpcStream<R>>> + Send + 'static,
        R: ResponseMessage + Send + 'static,
        D: Fn(R) -> Option<E> + Send + 'static,
        E: Send + 'static,
    {
        self.core().do_command_stream(open, decode).await
    }

    /// Opens a query-stream; like
    /// [`do_command_stream`](Session::do_command_stream) but with a read
    /// header and no registry record.
    pub async fn do_query_stream<F, Fut, R, D, E>(
        &self,
        open: F,
        decode: D,
    ) -> ClientResult<EventStream<E>>
    where
        F: FnMut(C::Transport, RequestHeader) -> Fut + Send + 'static,
        Fut: Future<Output = RpcResult<RpcStream<R>>> + Send + 'static,
        R: ResponseMessage + Send + 'static,
        D: Fn(R) -> Option<E> + Send + 'static,
        E: Send + 'static,
    {
        self.core().do_query_stream(open, decode).await
    }
}
