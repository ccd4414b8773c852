use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::ClientResult;
use crate::headers::{response_message, Name, PrimitiveKind, RequestHeader, ResponseHeader};
use crate::net::{Connector, Transport};
use crate::partition::{self, Partition};
use crate::session::{EventStream, Session};

mod methods {
    pub const GET_TERM: &str = "/strata.election.ElectionService/GetTerm";
    pub const ENTER: &str = "/strata.election.ElectionService/Enter";
    pub const LEAVE: &str = "/strata.election.ElectionService/Leave";
    pub const ANOINT: &str = "/strata.election.ElectionService/Anoint";
    pub const PROMOTE: &str = "/strata.election.ElectionService/Promote";
    pub const EVICT: &str = "/strata.election.ElectionService/Evict";
    pub const EVENTS: &str = "/strata.election.ElectionService/Events";
}

/// A leadership term: a globally unique, monotonically increasing id, the
/// elected leader, and the candidate queue in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: u64,
    #[serde(default)]
    pub leader: String,
    #[serde(default)]
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTermRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterRequest {
    pub header: RequestHeader,
    pub candidate_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermResponse {
    pub header: ResponseHeader,
    pub term: Term,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventResponse {
    pub header: ResponseHeader,
    pub term: Term,
}

response_message!(TermResponse, EventResponse);

/// Distributed leader election. The session's client id is the candidate
/// identity for [`enter`](Election::enter) and [`leave`](Election::leave).
pub struct Election<C: Connector> {
    session: Session<C>,
}

impl<C: Connector> Election<C> {
    pub async fn new(
        name: Name,
        partitions: &[Partition],
        connector: C,
        config: SessionConfig,
    ) -> ClientResult<Self> {
        let name = Name {
            kind: PrimitiveKind::Election,
            ..name
        };
        let partition = partition::select(&name, partitions)?.clone();
        let session = Session::open(name, partition, connector, config).await?;
        Ok(Self { session })
    }

    pub fn name(&self) -> &Name {
        self.session.name()
    }

    /// This client's candidate identity.
    pub fn id(&self) -> &str {
        self.session.client_id()
    }

    pub async fn get_term(&self) -> ClientResult<Term> {
        let response: TermResponse = self
            .session
            .do_query(|transport, header| {
                let request = GetTermRequest { header };
                async move { transport.unary(methods::GET_TERM, request).await }
            })
            .await?;
        Ok(response.term)
    }

    /// Joins the election and returns the resulting term.
    pub async fn enter(&self) -> ClientResult<Term> {
        let candidate_id = self.session.client_id().to_string();
        self.candidate_command(methods::ENTER, candidate_id).await
    }

    /// Withdraws from the election and returns the resulting term.
    pub async fn leave(&self) -> ClientResult<Term> {
        let candidate_id = self.session.client_id().to_string();
        self.candidate_command(methods::LEAVE, candidate_id).await
    }

    /// Transfers leadership to the candidate with `id`.
    pub async fn anoint(&self, id: &str) -> ClientResult<Term> {
        self.candidate_command(methods::ANOINT, id.to_string())
            .await
    }

    /// Moves the candidate with `id` up one place in the queue.
    pub async fn promote(&self, id: &str) -> ClientResult<Term> {
        self.candidate_command(methods::PROMOTE, id.to_string())
            .await
    }

    /// Removes the candidate with `id` from the election.
    pub async fn evict(&self, id: &str) -> ClientResult<Term> {
        self.candidate_command(methods::EVICT, id.to_string()).await
    }

    async fn candidate_command(
        &self,
        method: &'static str,
        candidate_id: String,
    ) -> ClientResult<Term> {
        let response: TermResponse = self
            .session
            .do_command(move |transport, header| {
                let request = EnterRequest {
                    header,
                    candidate_id: candidate_id.clone(),
                };
                async move { transport.unary(method, request).await }
            })
            .await?;
        Ok(response.term)
    }

    /// Streams term changes until the watcher is dropped or the session
    /// ends.
    pub async fn watch(&self) -> ClientResult<EventStream<Term>> {
        self.session
            .do_command_stream(
                |transport, header| {
                    let request = EventRequest { header };
                    async move { transport.server_stream(methods::EVENTS, request).await }
                },
                |response: EventResponse| Some(response.term),
            )
            .await
    }

    pub async fn close(mut self) -> ClientResult<()> {
        self.session.close().await
    }

    pub async fn delete(mut self) -> ClientResult<()> {
        self.session.delete().await
    }
}
