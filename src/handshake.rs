//! First-frame handshake.
//!
//! The browser is expected to be the first writer on stdio and its first frame
//! must be an `init` envelope. Anything else, or nothing within the timeout,
//! usually means the binary was started by hand.

use crate::envelope::{self, Action, DecodeError, InitParams};
use crate::host::{FrameError, FrameReceiver};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

const HINT: &str = "clay-relay expects to be launched by the browser extension. \
Did you mean to run with --register?";

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("no init message within {0:?}")]
    Timeout(Duration),

    #[error("stdin closed before init")]
    Disconnected,

    #[error("first frame unreadable: {0}")]
    Frame(#[from] FrameError),

    #[error("first frame is not an envelope: {0}")]
    Decode(DecodeError),

    #[error("expected init, got action {0:?}")]
    UnexpectedAction(String),

    #[error("invalid init payload: {0}")]
    InvalidInit(DecodeError),
}

impl HandshakeError {
    /// Directive text for whoever launched the process.
    pub fn hint(&self) -> &'static str {
        HINT
    }
}

/// Wait for the first frame and turn it into session parameters.
pub async fn await_init(
    frames: &mut FrameReceiver,
    timeout: Duration,
) -> Result<InitParams, HandshakeError> {
    debug!(?timeout, "awaiting init");
    let first = tokio::time::timeout(timeout, frames.recv())
        .await
        .map_err(|_| HandshakeError::Timeout(timeout))?;

    let bytes = match first {
        None => return Err(HandshakeError::Disconnected),
        Some(frame) => frame?,
    };

    let envelope = envelope::decode(&bytes).map_err(HandshakeError::Decode)?;
    if envelope.kind() != Action::Init {
        return Err(HandshakeError::UnexpectedAction(envelope.action));
    }

    let params = envelope.init_params().map_err(HandshakeError::InvalidInit)?;
    info!(tags = ?params.tags, "init received");
    Ok(params)
}
