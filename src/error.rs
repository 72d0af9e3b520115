use crate::handshake::HandshakeError;
use crate::host::FrameError;
use std::{io, net::SocketAddr};

/// Conditions that end the relay process.
///
/// Per-frame and per-connection problems never reach this type; they are
/// logged and dropped where they happen.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("stdin: {0}")]
    Stdin(FrameError),

    #[error("stdout: {0}")]
    Stdout(FrameError),

    #[error("cannot listen on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("websocket server stopped: {0}")]
    Server(io::Error),

    #[error("socket message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("cannot encode envelope: {0}")]
    Encode(serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RelayError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            RelayError::Handshake(_) => 2,
            _ => 1,
        }
    }
}
