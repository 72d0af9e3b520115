//! Process-level wiring: handshake, listener, announcement, dispatch, cleanup.

use crate::config::RelayConfig;
use crate::discovery;
use crate::error::RelayError;
use crate::handshake;
use crate::host::{self, NATIVE_ORDER};
use crate::server::SocketEndpoint;
use crate::session::Session;
use crate::switchboard::Switchboard;
use std::io::Read;
use std::net::SocketAddr;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Run the relay over the given stdio pair until the browser closes input
/// or a fatal error occurs.
///
/// Nothing listens on the network until the handshake has succeeded.
pub async fn run<R, W>(config: RelayConfig, input: R, output: W) -> Result<Session, RelayError>
where
    R: Read + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let order = *NATIVE_ORDER;
    let mut frames = host::spawn_reader(input, order, config.max_frame_size)?;

    let params = handshake::await_init(&mut frames, config.handshake_timeout()).await?;
    let mut session = Session::new();
    session.ready(params);

    let addr = SocketAddr::new(config.bind_address, config.port);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind { addr, source })?;
    let local = listener.local_addr()?;
    session.set_port(local.port());
    info!(address = %local, "listening (route: /ws)");

    let (endpoint, socket_events) =
        SocketEndpoint::new(session.token().to_string(), config.allow_concurrent);
    let mut server = tokio::spawn(async move { axum::serve(listener, endpoint.into_router()).await });

    let record = discovery::publish_for(&config.discovery, &session);

    let switchboard = Switchboard::new(
        session,
        output,
        order,
        config.max_message_size,
        frames,
        socket_events,
    );
    let outcome = tokio::select! {
        result = switchboard.run() => result,
        stopped = &mut server => Err(match stopped {
            Ok(Ok(())) => RelayError::Server(std::io::Error::other("listener closed")),
            Ok(Err(e)) => RelayError::Server(e),
            Err(e) => RelayError::Server(std::io::Error::other(e)),
        }),
    };
    server.abort();

    if let Some(record) = record {
        let path = record.path().to_path_buf();
        if let Err(e) = record.remove() {
            warn!(path = %path.display(), error = %e, "could not remove relay info");
        }
    }

    outcome
}
