//! The steady-state dispatch loop.
//!
//! One task waits on both inbound queues (stdio frames, socket events) and
//! performs every outbound write, so neither transport ever sees two writers.

use crate::envelope::{self, Action, Envelope};
use crate::error::RelayError;
use crate::host::{self, ByteOrder, FrameReceiver};
use crate::server::{ConnectionId, SocketEvent, SocketSink};
use crate::session::Session;
use axum::extract::ws::Message;
use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const STATUS_OPEN: &str = "open";
const STATUS_CLOSE: &str = "close";

struct ConnectedClient {
    id: ConnectionId,
    sink: SocketSink,
    // Dropped together with the client; that ends the socket's read loop.
    _closer: oneshot::Sender<()>,
}

pub struct Switchboard<W> {
    session: Session,
    output: W,
    order: ByteOrder,
    max_message_size: usize,
    frames: FrameReceiver,
    socket_events: mpsc::Receiver<SocketEvent>,
    client: Option<ConnectedClient>,
}

impl<W: AsyncWrite + Unpin> Switchboard<W> {
    pub fn new(
        session: Session,
        output: W,
        order: ByteOrder,
        max_message_size: usize,
        frames: FrameReceiver,
        socket_events: mpsc::Receiver<SocketEvent>,
    ) -> Self {
        Self {
            session,
            output,
            order,
            max_message_size,
            frames,
            socket_events,
            client: None,
        }
    }

    /// Announce the session, then dispatch until stdin closes or a fatal
    /// error occurs. Returns the closed session.
    pub async fn run(mut self) -> Result<Session, RelayError> {
        let banner = self.session.banner();
        self.emit(&Envelope::relay_message(banner)).await?;

        let outcome = self.dispatch().await;

        if let Some(id) = self.client.as_ref().map(|c| c.id) {
            // Stdout may already be the thing that failed.
            if let Err(e) = self.drop_client(id).await {
                debug!(error = %e, "could not report close");
            }
        }
        self.session.close();
        info!(
            largest_message = self.session.largest_message(),
            "switchboard stopped"
        );
        outcome.map(|()| self.session)
    }

    async fn dispatch(&mut self) -> Result<(), RelayError> {
        loop {
            tokio::select! {
                frame = self.frames.recv() => match frame {
                    None => return Ok(()),
                    Some(Ok(bytes)) => self.on_frame(&bytes).await?,
                    Some(Err(e)) if e.is_fatal() => return Err(RelayError::Stdin(e)),
                    Some(Err(e)) => warn!(error = %e, "dropping stdin frame"),
                },
                Some(event) = self.socket_events.recv() => self.on_socket_event(event).await?,
            }
        }
    }

    async fn on_frame(&mut self, bytes: &[u8]) -> Result<(), RelayError> {
        let envelope = match envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping undecodable stdin frame");
                return Ok(());
            }
        };
        match envelope.kind() {
            Action::Trpc => return self.forward_to_socket(envelope.trpc_body()).await,
            Action::Init => warn!("ignoring duplicate init"),
            Action::RelayMessage | Action::Other => {
                debug!(action = %envelope.action, "ignoring stdin envelope")
            }
        }
        Ok(())
    }

    /// A failed socket write costs only that connection.
    async fn forward_to_socket(&mut self, body: String) -> Result<(), RelayError> {
        let Some(client) = self.client.as_mut() else {
            debug!("no socket client, dropping message");
            return Ok(());
        };
        if let Err(e) = client.sink.send(Message::Text(body)).await {
            let id = client.id;
            warn!(connection = id, error = %e, "socket write failed, dropping client");
            return self.drop_client(id).await;
        }
        Ok(())
    }

    async fn on_socket_event(&mut self, event: SocketEvent) -> Result<(), RelayError> {
        match event {
            SocketEvent::Connected { id, sink, closer } => {
                if let Some(previous) = self.client.as_ref().map(|c| c.id) {
                    info!(connection = previous, "superseded by a new connection");
                    self.drop_client(previous).await?;
                }
                self.client = Some(ConnectedClient {
                    id,
                    sink,
                    _closer: closer,
                });
                self.emit(&Envelope::relay_message(STATUS_OPEN)).await
            }
            SocketEvent::Message { id, text } => {
                if !self.is_current(id) {
                    debug!(connection = id, "message from stale connection");
                    return Ok(());
                }
                if text.len() > self.max_message_size {
                    return Err(RelayError::MessageTooLarge {
                        size: text.len(),
                        max: self.max_message_size,
                    });
                }
                self.session.record_message_size(text.len());
                self.emit(&Envelope::trpc(text)).await
            }
            SocketEvent::Disconnected { id } => self.drop_client(id).await,
        }
    }

    fn is_current(&self, id: ConnectionId) -> bool {
        self.client.as_ref().is_some_and(|c| c.id == id)
    }

    /// Forget connection `id` (if it is the current one) and tell the extension.
    async fn drop_client(&mut self, id: ConnectionId) -> Result<(), RelayError> {
        if !self.is_current(id) {
            return Ok(());
        }
        self.client = None;
        self.emit(&Envelope::relay_message(STATUS_CLOSE)).await
    }

    async fn emit(&mut self, envelope: &Envelope) -> Result<(), RelayError> {
        let bytes = envelope::encode(envelope).map_err(RelayError::Encode)?;
        host::write_frame_async(&mut self.output, self.order, &bytes)
            .await
            .map_err(RelayError::Stdout)
    }
}
