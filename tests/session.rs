mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use strata_client::config::SessionConfig;
use strata_client::error::{ClientError, RpcError, RpcResult};
use strata_client::headers::{
    Name, PrimitiveKind, RequestHeader, ResponseHeader, ResponseMessage, ResponseStatus,
    ResponseType,
};
use strata_client::net::{Address, Transport};
use strata_client::partition::Partition;
use strata_client::session::{methods, KeepAliveRequest, OpenSessionResponse, Session};
use strata_client::session::{CloseSessionResponse, KeepAliveResponse};
use strata_client::utils::backoff::RetryConfig;

use support::{
    ok_header, scripted_stream, stream_header, to_value, MockConnector, PendingStream,
};

const TEST_COMMAND: &str = "/test.TestService/Command";
const TEST_QUERY: &str = "/test.TestService/Query";
const TEST_EVENTS: &str = "/test.TestService/Events";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TestRequest {
    header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TestResponse {
    header: ResponseHeader,
    #[serde(default)]
    value: i64,
}

impl ResponseMessage for TestResponse {
    fn header(&self) -> &ResponseHeader {
        &self.header
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TestEvent {
    header: ResponseHeader,
    #[serde(default)]
    value: String,
}

impl ResponseMessage for TestEvent {
    fn header(&self) -> &ResponseHeader {
        &self.header
    }
}

fn test_name() -> Name {
    Name::new("default", "test", PrimitiveKind::Map, "events")
}

fn event_frame(kind: ResponseType, index: u64, response_id: u64, value: &str) -> Value {
    to_value(&TestEvent {
        header: stream_header(kind, 1, index, response_id),
        value: value.to_string(),
    })
}

fn not_leader_frame(index: u64, leader: &str) -> Value {
    to_value(&TestEvent {
        header: ResponseHeader {
            status: ResponseStatus::NotLeader,
            kind: ResponseType::Response,
            session_id: 1,
            index,
            leader: Some(Address::from(leader)),
            ..ResponseHeader::default()
        },
        value: String::new(),
    })
}

/// Wraps a handler with the standard session service: OpenSession assigns
/// `(session_id, open_index)`, KeepAlive and CloseSession echo state.
fn with_session_rpcs<F>(
    session_id: u64,
    open_index: u64,
    inner: F,
) -> impl Fn(&Address, &'static str, &Value) -> RpcResult<Value> + Send + Sync + 'static
where
    F: Fn(&Address, &'static str, &Value) -> RpcResult<Value> + Send + Sync + 'static,
{
    move |address, method, request| match method {
        methods::OPEN_SESSION => Ok(to_value(&OpenSessionResponse {
            header: ok_header(session_id, open_index),
        })),
        methods::KEEP_ALIVE => {
            let request: KeepAliveRequest =
                serde_json::from_value(request.clone()).expect("keepalive request");
            Ok(to_value(&KeepAliveResponse {
                header: ok_header(request.header.session_id, request.header.index),
            }))
        }
        methods::CLOSE_SESSION => Ok(to_value(&CloseSessionResponse {
            header: ok_header(session_id, open_index),
        })),
        _ => inner(address, method, request),
    }
}

async fn open_session(connector: MockConnector, config: SessionConfig) -> Session<MockConnector> {
    Session::open(
        test_name(),
        Partition::new(1, "127.0.0.1:5001"),
        connector,
        config,
    )
    .await
    .expect("session open")
}

fn request_header(value: &Value) -> RequestHeader {
    serde_json::from_value(value.get("header").cloned().expect("header field"))
        .expect("request header")
}

#[tokio::test]
async fn open_command_query_advances_session_state() {
    let connector = MockConnector::new(with_session_rpcs(1, 10, |_, method, _| match method {
        TEST_COMMAND => Ok(to_value(&TestResponse {
            header: ok_header(1, 11),
            value: 1,
        })),
        TEST_QUERY => Ok(to_value(&TestResponse {
            header: ok_header(1, 11),
            value: 1,
        })),
        other => Err(RpcError::Transport(anyhow!("unexpected method {other}"))),
    }));

    let session = open_session(connector.clone(), SessionConfig::default()).await;
    assert_eq!(session.session_id(), 1);
    assert_eq!(session.last_index(), 10);

    let response: TestResponse = session
        .do_command(|transport, header| {
            let request = TestRequest { header };
            async move { transport.unary(TEST_COMMAND, request).await }
        })
        .await
        .unwrap();
    assert_eq!(response.value, 1);
    assert_eq!(session.session_id(), 1);
    assert_eq!(session.request_id(), 1);
    assert_eq!(session.response_id(), 1);
    assert_eq!(session.last_index(), 11);

    let _: TestResponse = session
        .do_query(|transport, header| {
            let request = TestRequest { header };
            async move { transport.unary(TEST_QUERY, request).await }
        })
        .await
        .unwrap();

    // query carried the response_id watermark and the observed index
    let queries = connector.calls_to(TEST_QUERY);
    assert_eq!(queries.len(), 1);
    let header = request_header(&queries[0].1);
    assert_eq!(header.session_id, 1);
    assert_eq!(header.request_id, 1);
    assert_eq!(header.index, 11);
}

#[tokio::test]
async fn command_request_ids_are_sequential() {
    let connector = MockConnector::new(with_session_rpcs(1, 10, |_, method, request| {
        match method {
            TEST_COMMAND => {
                let header = serde_json::from_value::<RequestHeader>(
                    request.get("header").cloned().unwrap(),
                )
                .unwrap();
                // index advances with every write
                Ok(to_value(&TestResponse {
                    header: ok_header(1, 10 + header.request_id),
                    value: 0,
                }))
            }
            other => Err(RpcError::Transport(anyhow!("unexpected method {other}"))),
        }
    }));

    let session = open_session(connector.clone(), SessionConfig::default()).await;
    for _ in 0..3 {
        let _: TestResponse = session
            .do_command(|transport, header| {
                let request = TestRequest { header };
                async move { transport.unary(TEST_COMMAND, request).await }
            })
            .await
            .unwrap();
    }

    let ids: Vec<u64> = connector
        .calls_to(TEST_COMMAND)
        .iter()
        .map(|(_, value)| request_header(value).request_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(session.response_id(), 3);
    assert_eq!(session.last_index(), 13);
}

#[tokio::test]
async fn not_leader_redirect_retries_with_same_request_id() {
    let connector = MockConnector::new(with_session_rpcs(1, 10, |address, method, _| {
        match method {
            TEST_COMMAND if address.as_str() == "127.0.0.1:5001" => Ok(to_value(&TestResponse {
                header: ResponseHeader {
                    status: ResponseStatus::NotLeader,
                    kind: ResponseType::Response,
                    session_id: 1,
                    index: 10,
                    leader: Some(Address::from("127.0.0.1:5002")),
                    ..ResponseHeader::default()
                },
                value: 0,
            })),
            TEST_COMMAND => Ok(to_value(&TestResponse {
                header: ok_header(1, 11),
                value: 7,
            })),
            other => Err(RpcError::Transport(anyhow!("unexpected method {other}"))),
        }
    }));

    let session = open_session(connector.clone(), SessionConfig::default()).await;
    let response: TestResponse = session
        .do_command(|transport, header| {
            let request = TestRequest { header };
            async move { transport.unary(TEST_COMMAND, request).await }
        })
        .await
        .unwrap();
    assert_eq!(response.value, 7);

    let commands = connector.calls_to(TEST_COMMAND);
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].0.as_str(), "127.0.0.1:5001");
    assert_eq!(commands[1].0.as_str(), "127.0.0.1:5002");
    let first = request_header(&commands[0].1);
    let second = request_header(&commands[1].1);
    assert_eq!(first.request_id, 1);
    assert_eq!(second.request_id, 1);
    // one dial for the original endpoint, one for the leader
    assert_eq!(connector.dials(), 2);
}

#[tokio::test(start_paused = true)]
async fn transport_failures_retry_then_surface_unavailable() {
    let connector = MockConnector::new(with_session_rpcs(1, 10, |_, method, _| match method {
        TEST_COMMAND => Err(RpcError::Transport(anyhow!("connection reset"))),
        other => Err(RpcError::Transport(anyhow!("unexpected method {other}"))),
    }));

    let config = SessionConfig {
        retry: RetryConfig {
            max_retries: Some(2),
            ..RetryConfig::default()
        },
        ..SessionConfig::default()
    };
    let session = open_session(connector.clone(), config).await;
    let err = session
        .do_command(|transport, header| {
            let request = TestRequest { header };
            async move { transport.unary::<_, TestResponse>(TEST_COMMAND, request).await }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unavailable(_)));

    // every attempt reused the same request id
    let commands = connector.calls_to(TEST_COMMAND);
    assert_eq!(commands.len(), 3);
    for (_, value) in &commands {
        assert_eq!(request_header(value).request_id, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn stream_handshake_times_out_and_abandons_the_rpc() {
    let dropped = Arc::new(AtomicBool::new(false));
    let dropped_probe = dropped.clone();
    let connector = MockConnector::with_streams(
        with_session_rpcs(1, 10, |_, method, _| {
            Err(RpcError::Transport(anyhow!("unexpected method {method}")))
        }),
        move |_, method, _| match method {
            TEST_EVENTS => Ok(Box::pin(PendingStream::new(dropped.clone()))
                as strata_client::net::RpcStream<Value>),
            other => Err(RpcError::Transport(anyhow!("unexpected stream {other}"))),
        },
    );

    let session = open_session(connector.clone(), SessionConfig::default()).await;
    let err = session
        .do_command_stream(
            |transport, header| {
                    let request = TestRequest { header };
                async move { transport.server_stream::<_, TestEvent>(TEST_EVENTS, request).await }
            },
            |event: TestEvent| Some(event.value),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout));

    // the reader task was aborted, dropping the server stream
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(dropped_probe.load(Ordering::SeqCst));
}

#[tokio::test]
async fn out_of_order_stream_frames_are_dropped() {
    // OPEN_STREAM consumes id 1; data frames carry (2, 4, 3, 5), then the
    // dropped frames are resent in sequence and the stream closes.
    let frames = vec![
        event_frame(ResponseType::OpenStream, 10, 1, ""),
        event_frame(ResponseType::Response, 11, 2, "a"),
        event_frame(ResponseType::Response, 12, 4, "b"),
        event_frame(ResponseType::Response, 13, 3, "c"),
        event_frame(ResponseType::Response, 14, 5, "d"),
        event_frame(ResponseType::Response, 14, 4, "b"),
        event_frame(ResponseType::Response, 15, 5, "d"),
        event_frame(ResponseType::CloseStream, 15, 6, ""),
    ];
    let connector = MockConnector::with_streams(
        with_session_rpcs(1, 10, |_, method, _| {
            Err(RpcError::Transport(anyhow!("unexpected method {method}")))
        }),
        move |_, method, _| match method {
            TEST_EVENTS => Ok(scripted_stream(frames.clone())),
            other => Err(RpcError::Transport(anyhow!("unexpected stream {other}"))),
        },
    );

    let session = open_session(connector.clone(), SessionConfig::default()).await;
    let mut events = session
        .do_command_stream(
            |transport, header| {
                    let request = TestRequest { header };
                async move { transport.server_stream::<_, TestEvent>(TEST_EVENTS, request).await }
            },
            |event: TestEvent| Some(event.value),
        )
        .await
        .unwrap();

    let mut delivered = Vec::new();
    while let Some(value) = events.recv().await {
        delivered.push(value);
    }
    assert_eq!(delivered, vec!["a", "c", "b", "d"]);
}

#[tokio::test]
async fn query_stream_forwards_without_gap_detection() {
    let frames = vec![
        event_frame(ResponseType::OpenStream, 10, 0, ""),
        event_frame(ResponseType::Response, 11, 0, "x"),
        event_frame(ResponseType::Response, 11, 0, "y"),
        event_frame(ResponseType::CloseStream, 11, 0, ""),
    ];
    let connector = MockConnector::with_streams(
        with_session_rpcs(1, 10, |_, method, _| {
            Err(RpcError::Transport(anyhow!("unexpected method {method}")))
        }),
        move |_, method, _| match method {
            TEST_EVENTS => Ok(scripted_stream(frames.clone())),
            other => Err(RpcError::Transport(anyhow!("unexpected stream {other}"))),
        },
    );

    let session = open_session(connector.clone(), SessionConfig::default()).await;
    let mut events = session
        .do_query_stream(
            |transport, header| {
                    let request = TestRequest { header };
                async move { transport.server_stream::<_, TestEvent>(TEST_EVENTS, request).await }
            },
            |event: TestEvent| Some(event.value),
        )
        .await
        .unwrap();

    let mut delivered = Vec::new();
    while let Some(value) = events.recv().await {
        delivered.push(value);
    }
    assert_eq!(delivered, vec!["x", "y"]);

    // the opening header was a query header: watermark, not a new write id
    let opens = connector.calls_to(TEST_EVENTS);
    assert_eq!(request_header(&opens[0].1).request_id, 0);
    assert_eq!(session.request_id(), 0);
}

#[tokio::test]
async fn stream_redirect_rebinds_in_place() {
    let connector = MockConnector::with_streams(
        with_session_rpcs(1, 10, |_, method, _| {
            Err(RpcError::Transport(anyhow!("unexpected method {method}")))
        }),
        move |address, method, _| match method {
            TEST_EVENTS if address.as_str() == "127.0.0.1:5001" => Ok(scripted_stream(vec![
                event_frame(ResponseType::OpenStream, 10, 1, ""),
                not_leader_frame(10, "127.0.0.1:5002"),
            ])),
            TEST_EVENTS => Ok(scripted_stream(vec![
                event_frame(ResponseType::OpenStream, 10, 2, ""),
                event_frame(ResponseType::Response, 11, 3, "x"),
                event_frame(ResponseType::CloseStream, 11, 4, ""),
            ])),
            other => Err(RpcError::Transport(anyhow!("unexpected stream {other}"))),
        },
    );

    let session = open_session(connector.clone(), SessionConfig::default()).await;
    let mut events = session
        .do_command_stream(
            |transport, header| {
                    let request = TestRequest { header };
                async move { transport.server_stream::<_, TestEvent>(TEST_EVENTS, request).await }
            },
            |event: TestEvent| Some(event.value),
        )
        .await
        .unwrap();

    let mut delivered = Vec::new();
    while let Some(value) = events.recv().await {
        delivered.push(value);
    }
    assert_eq!(delivered, vec!["x"]);

    // reopened on the leader with the identical stream header
    let opens = connector.calls_to(TEST_EVENTS);
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[0].0.as_str(), "127.0.0.1:5001");
    assert_eq!(opens[1].0.as_str(), "127.0.0.1:5002");
    assert_eq!(request_header(&opens[0].1), request_header(&opens[1].1));
}

#[tokio::test(start_paused = true)]
async fn keepalive_carries_acknowledged_stream_headers() {
    let connector = MockConnector::with_streams(
        with_session_rpcs(1, 10, |_, method, _| {
            Err(RpcError::Transport(anyhow!("unexpected method {method}")))
        }),
        move |_, method, _| match method {
            TEST_EVENTS => {
                let frames = futures::stream::iter(
                    vec![
                        event_frame(ResponseType::OpenStream, 10, 1, ""),
                        event_frame(ResponseType::Response, 11, 2, "a"),
                    ]
                    .into_iter()
                    .map(Ok),
                );
                Ok(Box::pin(frames.chain(futures::stream::pending()))
                    as strata_client::net::RpcStream<Value>)
            }
            other => Err(RpcError::Transport(anyhow!("unexpected stream {other}"))),
        },
    );

    let config = SessionConfig {
        timeout_ms: Some(2_000),
        ..SessionConfig::default()
    };
    let session = open_session(connector.clone(), config).await;
    let mut events = session
        .do_command_stream(
            |transport, header| {
                    let request = TestRequest { header };
                async move { transport.server_stream::<_, TestEvent>(TEST_EVENTS, request).await }
            },
            |event: TestEvent| Some(event.value),
        )
        .await
        .unwrap();
    assert_eq!(events.recv().await.as_deref(), Some("a"));

    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let keepalives = connector.calls_to(methods::KEEP_ALIVE);
    assert!(keepalives.len() >= 2, "expected keepalives at ~1s and ~2s");
    let last: KeepAliveRequest =
        serde_json::from_value(keepalives.last().unwrap().1.clone()).unwrap();
    assert_eq!(last.header.streams.len(), 1);
    assert_eq!(last.header.streams[0].stream_id, 1);
    assert_eq!(last.header.streams[0].response_id, 2);

    // dropping the stream unregisters it from subsequent keepalives
    drop(events);
    let before = connector.calls_to(methods::KEEP_ALIVE).len();
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let keepalives = connector.calls_to(methods::KEEP_ALIVE);
    assert!(keepalives.len() > before);
    let last: KeepAliveRequest =
        serde_json::from_value(keepalives.last().unwrap().1.clone()).unwrap();
    assert!(last.header.streams.is_empty());
}

#[tokio::test(start_paused = true)]
async fn fresh_stream_is_omitted_until_acknowledged() {
    let connector = MockConnector::with_streams(
        with_session_rpcs(1, 10, |_, method, _| {
            Err(RpcError::Transport(anyhow!("unexpected method {method}")))
        }),
        move |_, method, _| match method {
            TEST_EVENTS => {
                let frames = futures::stream::iter(
                    vec![event_frame(ResponseType::OpenStream, 10, 1, "")]
                        .into_iter()
                        .map(Ok),
                );
                Ok(Box::pin(frames.chain(futures::stream::pending()))
                    as strata_client::net::RpcStream<Value>)
            }
            other => Err(RpcError::Transport(anyhow!("unexpected stream {other}"))),
        },
    );

    let config = SessionConfig {
        timeout_ms: Some(2_000),
        ..SessionConfig::default()
    };
    let session = open_session(connector.clone(), config).await;
    let _events = session
        .do_command_stream(
            |transport, header| {
                    let request = TestRequest { header };
                async move { transport.server_stream::<_, TestEvent>(TEST_EVENTS, request).await }
            },
            |event: TestEvent| Some(event.value),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    // no response recorded for the creation command yet, so the stream is
    // not advertised
    let keepalives = connector.calls_to(methods::KEEP_ALIVE);
    assert!(!keepalives.is_empty());
    let last: KeepAliveRequest =
        serde_json::from_value(keepalives.last().unwrap().1.clone()).unwrap();
    assert!(last.header.streams.is_empty());
    assert_eq!(session.request_id(), 1);
    assert_eq!(session.response_id(), 0);
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent_and_stops_keepalives() {
    let connector = MockConnector::new(with_session_rpcs(1, 10, |_, method, _| {
        Err(RpcError::Transport(anyhow!("unexpected method {method}")))
    }));

    let mut session = open_session(connector.clone(), SessionConfig::default()).await;
    session.close().await.unwrap();

    let err = session.close().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert_eq!(connector.calls_to(methods::CLOSE_SESSION).len(), 1);

    // the keepalive task is gone for good
    let before = connector.calls_to(methods::KEEP_ALIVE).len();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.calls_to(methods::KEEP_ALIVE).len(), before);
}

#[tokio::test]
async fn server_error_surfaces_unknown() {
    let connector = MockConnector::new(with_session_rpcs(1, 10, |_, method, _| match method {
        TEST_COMMAND => Ok(to_value(&TestResponse {
            header: ResponseHeader {
                status: ResponseStatus::Error,
                kind: ResponseType::Response,
                session_id: 1,
                index: 10,
                ..ResponseHeader::default()
            },
            value: 0,
        })),
        other => Err(RpcError::Transport(anyhow!("unexpected method {other}"))),
    }));

    let session = open_session(connector.clone(), SessionConfig::default()).await;
    let err = session
        .do_command(|transport, header| {
            let request = TestRequest { header };
            async move { transport.unary::<_, TestResponse>(TEST_COMMAND, request).await }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unknown));
    // a server-side error is terminal, not retried
    assert_eq!(connector.calls_to(TEST_COMMAND).len(), 1);
}
