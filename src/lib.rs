//! # clay_relay
//!
//! A **native messaging host** that relays between a browser extension and a
//! local WebSocket client.
//!
//! Browser extensions can only reach native code over the native messaging
//! stdio protocol. This crate turns that pipe into a loopback WebSocket, so a
//! normal local process can exchange JSON with the extension.
//!
//! ---
//!
//! ## Wire protocol (stdio)
//!
//! 1. The sender writes a **4-byte length prefix** (`u32`) in **native endianness**.
//! 2. Then writes **that many bytes** of UTF-8 JSON.
//!
//! Every frame carries an envelope:
//!
//! ```json
//! { "action": "trpc", "payload": "<opaque message>" }
//! ```
//!
//! | `action` | direction | payload |
//! |---|---|---|
//! | `init` | browser → relay, first frame only | `{ "tags": ["..."] }` |
//! | `relayMessage` | relay → browser | status text: banner, `open`, `close` |
//! | `trpc` | both | the relayed message as a JSON string |
//!
//! ## Lifecycle
//!
//! 1. The browser launches the relay and must send `init` within 500 ms.
//!    Anything else ends the process with a hint to run `--register`.
//! 2. The relay binds `127.0.0.1:<ephemeral>` and sends
//!    `relayMessage("clay-relay ready port=<port> token=<token>")`.
//! 3. One client connects to `ws://127.0.0.1:<port>/ws?token=<token>`.
//!    A wrong token gets HTTP 403; a second client while one is connected gets 400.
//! 4. Socket text frames become `trpc` envelopes on stdout and `trpc`
//!    envelopes from stdin become socket text frames.
//! 5. The relay exits when the browser closes stdin, or on a fatal error such
//!    as a socket message over 1 MiB.
//!
//! ### Gotchas
//!
//! - **Never log to stdout:** stdout is reserved for framed protocol messages.
//!   All logging here goes through `tracing` to stderr.
//! - **Disconnect is normal:** the browser closing stdin is a clean shutdown.
//!
//! ---
//!
//! ## Crate layout
//!
//! - [`host`]: framing over stdin/stdout and the stdin reader thread.
//! - [`envelope`]: the `{action, payload}` codec.
//! - [`handshake`]: first-frame `init` validation.
//! - [`session`]: session state and bearer token.
//! - [`server`]: the `/ws` endpoint and its single connection slot.
//! - [`switchboard`]: the dispatch loop that owns every outbound write.
//! - [`relay`]: wires the pieces together for one process lifetime.
//! - [`discovery`]: the `relayinfo-<port>.json` record for companion viewers.
//! - [`install`]: `--register` / `--unregister` for Chrome.
//! - [`config`]: TOML configuration.
//!
//! ## Pure framing
//!
//! ```rust
//! use clay_relay::envelope::{self, Envelope};
//! use clay_relay::host::{encode_frame, read_frame, MAX_FROM_BROWSER, NATIVE_ORDER};
//! use std::io::Cursor;
//!
//! let msg = Envelope::trpc(r#"{"id":1}"#);
//! let frame = encode_frame(*NATIVE_ORDER, &envelope::encode(&msg).unwrap()).unwrap();
//!
//! let mut cur = Cursor::new(frame);
//! let raw = read_frame(&mut cur, *NATIVE_ORDER, MAX_FROM_BROWSER).unwrap().unwrap();
//! assert_eq!(envelope::decode(&raw).unwrap(), msg);
//! ```
//!
//! ## Running the relay
//!
//! ```no_run
//! use clay_relay::{config::RelayConfig, relay};
//!
//! #[tokio::main]
//! async fn main() {
//!     let result = relay::run(RelayConfig::default(), std::io::stdin(), tokio::io::stdout()).await;
//!     if let Err(e) = result {
//!         eprintln!("relay stopped: {e}");
//!     }
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod host;
pub mod install;
pub mod relay;
pub mod server;
pub mod session;
pub mod switchboard;

#[doc(inline)]
pub use config::RelayConfig;
#[doc(inline)]
pub use envelope::Envelope;
#[doc(inline)]
pub use error::RelayError;
