//! Per-process session: lifecycle state, bearer token, port and tags.

use crate::envelope::InitParams;
use rand::Rng;
use std::collections::BTreeSet;
use tracing::debug;

/// Random bytes in a session token (rendered as twice as many hex chars).
pub const TOKEN_BYTES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInit,
    Ready,
    Closed,
}

#[derive(Debug)]
pub struct Session {
    state: SessionState,
    token: String,
    port: u16,
    tags: BTreeSet<String>,
    largest_message: usize,
}

/// Fresh random hex token.
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::thread_rng().gen();
    hex::encode(bytes)
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::AwaitingInit,
            token: String::new(),
            port: 0,
            tags: BTreeSet::new(),
            largest_message: 0,
        }
    }

    /// Promote to `Ready` with the handshake's parameters and a new token.
    ///
    /// Only the first call has any effect.
    pub fn ready(&mut self, params: InitParams) -> bool {
        if self.state != SessionState::AwaitingInit {
            return false;
        }
        self.tags = params.tags;
        self.token = generate_token();
        self.state = SessionState::Ready;
        true
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn largest_message(&self) -> usize {
        self.largest_message
    }

    /// Track the size of a forwarded socket message. Returns true on a new maximum.
    pub fn record_message_size(&mut self, size: usize) -> bool {
        if size <= self.largest_message {
            return false;
        }
        self.largest_message = size;
        debug!(size, "largest socket message so far");
        true
    }

    /// Text of the startup `relayMessage` telling the extension where to connect.
    pub fn banner(&self) -> String {
        format!("clay-relay ready port={} token={}", self.port, self.token)
    }
}
