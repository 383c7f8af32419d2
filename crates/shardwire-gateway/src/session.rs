//! Per-shard session state

use crate::protocol::{IdentifyPayload, ResumePayload};

/// Identity and progress of one shard's gateway session
///
/// Owned by a single [`GatewayHandler`](crate::gateway::GatewayHandler);
/// never shared across tasks.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionState {
    pub token: String,
    /// Full connection URL, query string included
    pub gateway_url: String,
    pub shard_id: u32,
    pub shard_count: u32,
    pub session_id: Option<String>,
    /// Last sequence number received
    pub sequence: Option<u64>,
    pub authenticated: bool,
}

impl SessionState {
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        gateway_url: impl Into<String>,
        shard_id: u32,
        shard_count: u32,
    ) -> Self {
        Self {
            token: token.into(),
            gateway_url: gateway_url.into(),
            shard_id,
            shard_count,
            session_id: None,
            sequence: None,
            authenticated: false,
        }
    }

    /// Whether a HELLO should be answered with RESUME rather than IDENTIFY
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    /// Forget the session; the next handshake identifies from scratch
    pub fn clear(&mut self) {
        self.session_id = None;
        self.sequence = None;
    }

    /// Forget the session after a non-resumable invalidation
    ///
    /// The sequence restarts at 0 rather than null.
    pub fn invalidate(&mut self) {
        self.session_id = None;
        self.sequence = Some(0);
    }

    #[must_use]
    pub fn identify_payload(&self) -> IdentifyPayload {
        IdentifyPayload::new(self.token.clone(), self.shard_id, self.shard_count)
    }

    /// RESUME body, or `None` when there is no session to resume
    #[must_use]
    pub fn resume_payload(&self) -> Option<ResumePayload> {
        self.session_id.as_ref().map(|session_id| ResumePayload {
            token: self.token.clone(),
            session_id: session_id.clone(),
            seq: self.sequence,
        })
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("token", &"<redacted>")
            .field("gateway_url", &self.gateway_url)
            .field("shard_id", &self.shard_id)
            .field("shard_count", &self.shard_count)
            .field("session_id", &self.session_id)
            .field("sequence", &self.sequence)
            .field("authenticated", &self.authenticated)
            .finish()
    }
}
