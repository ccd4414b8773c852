use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use bytes::{Buf, BufMut, Bytes};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tonic::client::Grpc;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint, Uri};
use tonic::{Code, Request, Status};

use crate::error::{ClientError, ClientResult, RpcError, RpcResult};
use crate::net::{Address, Connector, RpcStream, Transport};

/// Channel construction knobs, applied to every endpoint this connector
/// dials (the original endpoint and any NOT_LEADER redirect target).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GrpcChannelSpec {
    /// Timeout for establishing the TCP/TLS connection (milliseconds).
    pub connect_timeout_ms: Option<u64>,
    /// Overall per-RPC timeout (milliseconds).
    pub request_timeout_ms: Option<u64>,
    pub tcp_nodelay: Option<bool>,
    pub http2_keepalive_interval_ms: Option<u64>,
    pub http2_keepalive_timeout_ms: Option<u64>,
    pub max_decoding_message_size: Option<usize>,
    pub max_encoding_message_size: Option<usize>,
}

/// Production connector: one tonic channel per bound endpoint.
#[derive(Debug, Clone, Default)]
pub struct GrpcConnector {
    spec: GrpcChannelSpec,
}

impl GrpcConnector {
    pub fn new(spec: GrpcChannelSpec) -> Self {
        Self { spec }
    }

    fn endpoint(&self, address: &Address) -> ClientResult<Endpoint> {
        let uri = if address.as_str().contains("://") {
            address.as_str().to_string()
        } else {
            format!("http://{address}")
        };

        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| ClientError::InvalidArgument(format!("invalid address '{uri}': {e}")))?;

        if uri.starts_with("https://") {
            let domain = Uri::try_from(&uri)
                .ok()
                .and_then(|u| u.host().map(|h| h.to_string()))
                .ok_or_else(|| {
                    ClientError::InvalidArgument(format!("https address without host: {uri}"))
                })?;
            endpoint = endpoint
                .tls_config(
                    ClientTlsConfig::new()
                        .with_native_roots()
                        .domain_name(domain),
                )
                .map_err(|e| ClientError::Unavailable(format!("tls config error: {e}")))?;
        }

        endpoint = endpoint
            .connect_timeout(Duration::from_millis(
                self.spec.connect_timeout_ms.unwrap_or(5_000),
            ))
            .timeout(Duration::from_millis(
                self.spec.request_timeout_ms.unwrap_or(10_000),
            ))
            .tcp_nodelay(self.spec.tcp_nodelay.unwrap_or(true));

        if let Some(ms) = self.spec.http2_keepalive_interval_ms {
            endpoint = endpoint.http2_keep_alive_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.spec.http2_keepalive_timeout_ms {
            endpoint = endpoint.keep_alive_timeout(Duration::from_millis(ms));
        }

        Ok(endpoint)
    }
}

impl Connector for GrpcConnector {
    type Transport = GrpcTransport;

    fn connect(
        &self,
        address: &Address,
    ) -> impl Future<Output = ClientResult<Self::Transport>> + Send {
        let endpoint = self.endpoint(address);
        let spec = self.spec.clone();
        let address = address.clone();
        async move {
            let channel = endpoint?
                .connect()
                .await
                .map_err(|e| ClientError::Unavailable(format!("connect to {address}: {e}")))?;
            Ok(GrpcTransport { channel, spec })
        }
    }
}

/// Transport over a tonic channel. Messages are serde structs framed as
/// JSON bytes through [`RawCodec`], so no generated schema is involved.
#[derive(Clone)]
pub struct GrpcTransport {
    channel: Channel,
    spec: GrpcChannelSpec,
}

impl GrpcTransport {
    fn grpc(&self) -> Grpc<Channel> {
        let mut grpc = Grpc::new(self.channel.clone());
        if let Some(size) = self.spec.max_decoding_message_size {
            grpc = grpc.max_decoding_message_size(size);
        }
        if let Some(size) = self.spec.max_encoding_message_size {
            grpc = grpc.max_encoding_message_size(size);
        }
        grpc
    }
}

fn encode<Req: Serialize>(request: &Req) -> RpcResult<Bytes> {
    serde_json::to_vec(request)
        .map(Bytes::from)
        .map_err(|e| RpcError::Transport(anyhow!("request encoding failed: {e}")))
}

fn decode<Res: DeserializeOwned>(bytes: &Bytes) -> RpcResult<Res> {
    serde_json::from_slice(bytes)
        .map_err(|e| RpcError::Transport(anyhow!("response decoding failed: {e}")))
}

fn status_error(status: Status) -> RpcError {
    if status.code() == Code::Cancelled {
        RpcError::Canceled
    } else {
        RpcError::Transport(anyhow!("rpc failed: {status}"))
    }
}

impl Transport for GrpcTransport {
    fn unary<Req, Res>(
        &self,
        method: &'static str,
        request: Req,
    ) -> impl Future<Output = RpcResult<Res>> + Send
    where
        Req: Serialize + Send + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        let mut grpc = self.grpc();
        async move {
            let body = encode(&request)?;
            grpc.ready()
                .await
                .map_err(|e| RpcError::Transport(anyhow!("channel not ready: {e}")))?;
            let response = grpc
                .unary(
                    Request::new(body),
                    PathAndQuery::from_static(method),
                    RawCodec,
                )
                .await
                .map_err(status_error)?;
            decode(&response.into_inner())
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
        let mut grpc = self.grpc();
        async move {
            let body = encode(&request)?;
            grpc.ready()
                .await
                .map_err(|e| RpcError::Transport(anyhow!("channel not ready: {e}")))?;
            let response = grpc
                .server_streaming(
                    Request::new(body),
                    PathAndQuery::from_static(method),
                    RawCodec,
                )
                .await
                .map_err(status_error)?;
            let inbound = response.into_inner().map(|item| match item {
                Ok(bytes) => decode(&bytes),
                Err(status) => Err(status_error(status)),
            });
            Ok(Box::pin(inbound) as RpcStream<Res>)
        }
    }
}

/// Codec that hands raw [`Bytes`] to tonic unchanged; tonic supplies the
/// gRPC framing and compression on top.
#[derive(Clone, Default)]
pub struct RawCodec;

#[derive(Clone, Default)]
pub struct RawEncoder;

#[derive(Clone, Default)]
pub struct RawDecoder;

impl Encoder for RawEncoder {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for RawDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let n = src.remaining();
        Ok(Some(src.copy_to_bytes(n)))
    }
}

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawEncoder;
    type Decoder = RawDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawDecoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_rejects_garbage_address() {
        let connector = GrpcConnector::default();
        let err = connector.endpoint(&Address::from("not a uri")).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn bare_host_port_gets_a_scheme() {
        let connector = GrpcConnector::default();
        assert!(connector.endpoint(&Address::from("127.0.0.1:5678")).is_ok());
    }
}
