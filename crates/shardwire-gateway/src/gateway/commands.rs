//! Commands queued to a running gateway handler from other tasks

use crate::error::GatewayError;
use crate::protocol::PresenceUpdate;
use tokio::sync::mpsc;

/// Work a handler performs between transport events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCommand {
    UpdatePresence(PresenceUpdate),
    /// Guild ids whose full member lists should be chunked down
    RequestGuildMembers(Vec<u64>),
}

/// Cloneable handle for queueing commands to one handler
#[derive(Debug, Clone)]
pub struct GatewayCommander {
    tx: mpsc::UnboundedSender<GatewayCommand>,
}

impl GatewayCommander {
    pub(crate) fn new(tx: mpsc::UnboundedSender<GatewayCommand>) -> Self {
        Self { tx }
    }

    pub fn send(&self, command: GatewayCommand) -> Result<(), GatewayError> {
        self.tx
            .send(command)
            .map_err(|_| GatewayError::Protocol("gateway handler is gone".to_string()))
    }

    pub fn update_presence(&self, presence: PresenceUpdate) -> Result<(), GatewayError> {
        self.send(GatewayCommand::UpdatePresence(presence))
    }

    pub fn request_guild_members(&self, guild_ids: &[u64]) -> Result<(), GatewayError> {
        self.send(GatewayCommand::RequestGuildMembers(guild_ids.to_vec()))
    }
}
