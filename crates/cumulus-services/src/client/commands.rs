//! Command listener — DELETE/UPDATE requests arriving on the client port.

use tokio::sync::broadcast;

use cumulus_core::Message;

use super::ClientContext;
use crate::error::SyncError;
use crate::net::RECV_BUFFER_LEN;

pub struct CommandListener {
    ctx: ClientContext,
    shutdown: broadcast::Receiver<()>,
}

impl CommandListener {
    pub fn new(ctx: ClientContext, shutdown: broadcast::Receiver<()>) -> Self {
        Self { ctx, shutdown }
    }

    pub async fn run(mut self) -> Result<(), SyncError> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        tracing::info!("command listener starting");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("command listener shutting down");
                    return Ok(());
                }

                result = self.ctx.socket.recv_from(&mut buf) => {
                    let (len, peer) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };

                    let command = match Message::decode(&buf[..len]) {
                        Ok(Message::Command(command)) => command,
                        Ok(Message::Chunk(chunk)) => {
                            tracing::warn!(
                                %peer,
                                file = %chunk.file_name,
                                "unexpected chunk on command port, dropping"
                            );
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!(%peer, error = %e, "invalid command received, dropping");
                            continue;
                        }
                    };

                    tracing::debug!(%peer, %command, "command received");
                    match self.ctx.apply_command(&command, &mut self.shutdown).await {
                        Ok(outcome) => tracing::debug!(%command, ?outcome, "command applied"),
                        Err(SyncError::Interrupted) => {
                            tracing::info!("command listener interrupted mid-transfer");
                            return Ok(());
                        }
                        Err(e) => tracing::warn!(%command, error = %e, "command failed"),
                    }
                }
            }
        }
    }
}
