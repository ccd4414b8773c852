pub use crate::client::{ClientConfig, StrataClient};
pub use crate::config::SessionConfig;
pub use crate::error::{ClientError, ClientResult, RpcError, RpcResult};
pub use crate::headers::{
    Name, PrimitiveKind, RequestHeader, ResponseHeader, ResponseMessage, ResponseStatus,
    ResponseType, StreamHeader,
};
pub use crate::net::grpc::{GrpcChannelSpec, GrpcConnector, GrpcTransport};
pub use crate::net::{Address, Connector, Conns, RpcStream, Transport};
pub use crate::partition::Partition;
pub use crate::primitives::counter::Counter;
pub use crate::primitives::election::{Election, Term};
pub use crate::primitives::indexed_map::{IndexedEntry, IndexedMap};
pub use crate::primitives::list::{List, ListSlice};
pub use crate::primitives::lock::Lock;
pub use crate::primitives::log::{Log, Record};
pub use crate::primitives::map::{Entry, Map, MapEvent};
pub use crate::primitives::set::{Set, SetEvent};
pub use crate::primitives::value::{Value, ValueEvent};
pub use crate::session::{EventStream, Session};
pub use crate::utils::backoff::{Backoff, RetryConfig};
