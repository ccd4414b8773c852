use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::{ClientError, ClientResult};
use crate::headers::{Name, PrimitiveKind};
use crate::net::Connector;
use crate::partition::Partition;
use crate::primitives::counter::Counter;
use crate::primitives::election::Election;
use crate::primitives::indexed_map::IndexedMap;
use crate::primitives::list::List;
use crate::primitives::lock::Lock;
use crate::primitives::log::Log;
use crate::primitives::map::Map;
use crate::primitives::set::Set;
use crate::primitives::value::Value;

/// Client-wide options. `namespace` and `scope` qualify every primitive
/// name this client creates; `session` seeds each primitive's session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub namespace: String,
    pub scope: String,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            scope: "default".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads client options from environment variables.
    /// Recognized: STRATA_NAMESPACE, STRATA_SCOPE, plus the session
    /// variables read by [`SessionConfig::from_env`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            namespace: std::env::var("STRATA_NAMESPACE").unwrap_or(defaults.namespace),
            scope: std::env::var("STRATA_SCOPE").unwrap_or(defaults.scope),
            session: SessionConfig::from_env(),
        }
    }
}

/// Entry point: a partition set plus naming and session defaults. Each
/// primitive handle opens its own session on the partition its name hashes
/// to; the client itself holds no connections.
#[derive(Debug)]
pub struct StrataClient<C: Connector + Clone> {
    partitions: Vec<Partition>,
    connector: C,
    config: ClientConfig,
}

impl<C: Connector + Clone> StrataClient<C> {
    pub fn new(
        partitions: Vec<Partition>,
        connector: C,
        config: ClientConfig,
    ) -> ClientResult<Self> {
        if partitions.is_empty() {
            return Err(ClientError::InvalidArgument(
                "partition set is empty".to_string(),
            ));
        }
        Ok(Self {
            partitions,
            connector,
            config,
        })
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    fn name(&self, kind: PrimitiveKind, name: &str) -> Name {
        Name::new(
            self.config.namespace.clone(),
            self.config.scope.clone(),
            kind,
            name,
        )
    }

    fn session_config(&self) -> SessionConfig {
        self.config.session.clone()
    }

    pub async fn counter(&self, name: &str) -> ClientResult<Counter<C>> {
        Counter::new(
            self.name(PrimitiveKind::Counter, name),
            &self.partitions,
            self.connector.clone(),
            self.session_config(),
        )
        .await
    }

    pub async fn value(&self, name: &str) -> ClientResult<Value<C>> {
        Value::new(
            self.name(PrimitiveKind::Value, name),
            &self.partitions,
            self.connector.clone(),
            self.session_config(),
        )
        .await
    }

    pub async fn map(&self, name: &str) -> ClientResult<Map<C>> {
        Map::new(
            self.name(PrimitiveKind::Map, name),
            &self.partitions,
            self.connector.clone(),
            self.session_config(),
        )
        .await
    }

    pub async fn indexed_map(&self, name: &str) -> ClientResult<IndexedMap<C>> {
        IndexedMap::new(
            self.name(PrimitiveKind::IndexedMap, name),
            &self.partitions,
            self.connector.clone(),
            self.session_config(),
        )
        .await
    }

    pub async fn set(&self, name: &str) -> ClientResult<Set<C>> {
        Set::new(
            self.name(PrimitiveKind::Set, name),
            &self.partitions,
            self.connector.clone(),
            self.session_config(),
        )
        .await
    }

    pub async fn list(&self, name: &str) -> ClientResult<List<C>> {
        List::new(
            self.name(PrimitiveKind::List, name),
            &self.partitions,
            self.connector.clone(),
            self.session_config(),
        )
        .await
    }

    pub async fn log(&self, name: &str) -> ClientResult<Log<C>> {
        Log::new(
            self.name(PrimitiveKind::Log, name),
            &self.partitions,
            self.connector.clone(),
            self.session_config(),
        )
        .await
    }

    pub async fn lock(&self, name: &str) -> ClientResult<Lock<C>> {
        Lock::new(
            self.name(PrimitiveKind::Lock, name),
            &self.partitions,
            self.connector.clone(),
            self.session_config(),
        )
        .await
    }

    pub async fn election(&self, name: &str) -> ClientResult<Election<C>> {
        Election::new(
            self.name(PrimitiveKind::Election, name),
            &self.partitions,
            self.connector.clone(),
            self.session_config(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::grpc::GrpcConnector;

    #[test]
    fn empty_partition_set_is_rejected() {
        let err = StrataClient::new(
            Vec::new(),
            GrpcConnector::default(),
            ClientConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }
}
