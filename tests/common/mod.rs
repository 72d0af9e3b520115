#![allow(dead_code)]

use clay_relay::envelope::{self, Envelope, InitParams};
use clay_relay::host::{encode_frame, NATIVE_ORDER};
use clay_relay::session::Session;
use clay_relay::{relay, RelayConfig, RelayError};
use std::io::{self, Read};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use std::{collections::HashMap, env};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::task::JoinHandle;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Env guard that restores previous env vars on drop.
pub struct EnvGuard {
    old: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn set(vars: &[(&str, String)]) -> Self {
        let mut old = HashMap::new();
        for (k, v) in vars {
            old.insert((*k).to_string(), env::var(k).ok());
            env::set_var(k, v);
        }
        Self { old }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (k, prev) in self.old.drain() {
            match prev {
                Some(v) => env::set_var(k, v),
                None => env::remove_var(k),
            }
        }
    }
}

/// Temp sandbox with HOME pointed into it, so manifests never touch the real profile.
pub fn sandbox_env() -> (TempDir, EnvGuard) {
    let td = TempDir::new().expect("tempdir");
    let home = td.path().join("home");
    std::fs::create_dir_all(&home).unwrap();
    let guard = EnvGuard::set(&[("HOME", home.to_string_lossy().to_string())]);
    (td, guard)
}

/// Blocking reader fed from a channel; reads 0 (EOF) once every sender is gone.
pub struct ChannelReader {
    rx: std_mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    pub fn new() -> (std_mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = std_mpsc::channel();
        (
            tx,
            Self {
                rx,
                pending: Vec::new(),
                pos: 0,
            },
        )
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// The extension's end of the stdio pipe.
pub struct Browser {
    input: Option<std_mpsc::Sender<Vec<u8>>>,
    output: DuplexStream,
}

impl Browser {
    pub fn send_raw(&self, bytes: Vec<u8>) {
        if let Some(tx) = &self.input {
            let _ = tx.send(bytes);
        }
    }

    pub fn send(&self, envelope: &Envelope) {
        let json = envelope::encode(envelope).expect("encode envelope");
        self.send_raw(encode_frame(*NATIVE_ORDER, &json).expect("frame"));
    }

    pub fn send_init(&self, tags: &[&str]) {
        let params = InitParams {
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        self.send(&Envelope::init(&params));
    }

    /// Close stdin, as the browser does when the extension disconnects.
    pub fn close(&mut self) {
        self.input = None;
    }

    pub async fn recv(&mut self) -> Envelope {
        tokio::time::timeout(STEP_TIMEOUT, self.read_envelope())
            .await
            .expect("timed out waiting for a frame from the relay")
    }

    async fn read_envelope(&mut self) -> Envelope {
        let mut len_buf = [0u8; 4];
        self.output.read_exact(&mut len_buf).await.expect("length prefix");
        let len = NATIVE_ORDER.decode_len(len_buf) as usize;
        let mut body = vec![0u8; len];
        self.output.read_exact(&mut body).await.expect("frame body");
        envelope::decode(&body).expect("envelope")
    }

    /// Everything the relay wrote until it closed stdout.
    pub async fn drain(&mut self) -> Vec<u8> {
        let mut rest = Vec::new();
        tokio::time::timeout(STEP_TIMEOUT, self.output.read_to_end(&mut rest))
            .await
            .expect("relay did not close stdout")
            .expect("read stdout");
        rest
    }

    /// Read the startup banner and return `(port, token)`.
    pub async fn recv_banner(&mut self) -> (u16, String) {
        let banner = self.recv().await;
        assert_eq!(banner.action, "relayMessage");
        let text = banner.payload.as_str().expect("banner text").to_string();
        parse_banner(&text)
    }
}

pub fn parse_banner(text: &str) -> (u16, String) {
    let mut port = None;
    let mut token = None;
    for part in text.split_whitespace() {
        if let Some(p) = part.strip_prefix("port=") {
            port = p.parse().ok();
        } else if let Some(t) = part.strip_prefix("token=") {
            token = Some(t.to_string());
        }
    }
    (
        port.expect("port in banner"),
        token.expect("token in banner"),
    )
}

/// Config for tests: no discovery record unless a test asks for one.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.discovery.enabled = false;
    config
}

pub fn spawn_relay(config: RelayConfig) -> (Browser, JoinHandle<Result<Session, RelayError>>) {
    let (tx, reader) = ChannelReader::new();
    let (relay_out, browser_out) = tokio::io::duplex(4 * 1024 * 1024);
    let handle = tokio::spawn(relay::run(config, reader, relay_out));
    (
        Browser {
            input: Some(tx),
            output: browser_out,
        },
        handle,
    )
}

pub async fn join_relay(
    handle: JoinHandle<Result<Session, RelayError>>,
) -> Result<Session, RelayError> {
    tokio::time::timeout(STEP_TIMEOUT, handle)
        .await
        .expect("relay did not stop")
        .expect("relay task panicked")
}

pub fn ws_url(port: u16, token: &str) -> String {
    format!("ws://127.0.0.1:{port}/ws?token={token}")
}
