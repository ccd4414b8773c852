use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::ClientResult;
use crate::headers::{response_message, Name, PrimitiveKind, RequestHeader, ResponseHeader};
use crate::net::{Connector, Transport};
use crate::partition::{self, Partition};
use crate::session::Session;

mod methods {
    pub const LOCK: &str = "/strata.lock.LockService/Lock";
    pub const UNLOCK: &str = "/strata.lock.LockService/Unlock";
    pub const IS_LOCKED: &str = "/strata.lock.LockService/IsLocked";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResponse {
    pub header: ResponseHeader,
    /// Fencing token for this acquisition.
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub header: RequestHeader,
    /// Release only if held with this token; 0 releases unconditionally.
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub header: ResponseHeader,
    pub unlocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsLockedRequest {
    pub header: RequestHeader,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsLockedResponse {
    pub header: ResponseHeader,
    pub locked: bool,
}

response_message!(LockResponse, UnlockResponse, IsLockedResponse);

/// Distributed lock. Acquisitions return a fencing token; the token can be
/// handed to [`unlock`](Lock::unlock) and [`is_locked`](Lock::is_locked) to
/// act only on that acquisition.
pub struct Lock<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> Lock<C> {
    pub async fn new(
        name: Name,
        partitions: &[Partition],
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let name = Name {
            kind: PrimitiveKind::Lock,
            ..name
        };
        let partition = partition::select(&name, partitions)?.clone();
        let session = Session::open(name, partition, connector, config).await?;
        Ok(Self { session })
    }

    pub fn name(&self) -> &Name {
        self.session.name()
    }

    /// Blocks until the lock is acquired; returns the fencing token.
    pub async fn lock(&self) -> ClientResult<u64> {
        let response: LockResponse = self
            .session
            .do_command(|transport, header| {
                let request = LockRequest { header };
                async move { transport.unary(methods::LOCK, request).await }
            })
            .await?;
        Ok(response.version)
    }

    /// Releases the lock; with a non-zero `version`, only if still held by
    /// that acquisition. Returns whether anything was released.
    pub async fn unlock(&self, version: u64) -> ClientResult<bool> {
        let response: UnlockResponse = self
            .session
            .do_command(move |transport, header| {
                let request = UnlockRequest { header, version };
                async move { transport.unary(methods::UNLOCK, request).await }
            })
            .await?;
        Ok(response.unlocked)
    }

    /// With a non-zero `version`, whether that acquisition still holds the
    /// lock; otherwise whether anyone does.
    pub async fn is_locked(&self, version: u64) -> ClientResult<bool> {
        let response: IsLockedResponse = self
            .session
            .do_query(move |transport, header| {
                let request = IsLockedRequest { header, version };
                async move { transport.unary(methods::IS_LOCKED, request).await }
            })
            .await?;
        Ok(response.locked)
    }

    pub async fn close(mut self) -> ClientResult<()> {
        self.session.close().await
    }

    pub async fn delete(mut self) -> ClientResult<()> {
        self.session.delete().await
    }
}
