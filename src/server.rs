//! The `ROUTER`-role accept loop: one handshake, then one handler
//! invocation per connection, sequentially driving `receive`/`send` in
//! lockstep (no concurrent writer needed here, unlike [`crate::client`]).

use std::future::Future;
use std::sync::Arc;

use compio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::config::Config;
use crate::crypto::CurveKeyPair;
use crate::error::{CurveZmqError, Result};
use crate::handshake;
use crate::session::Session;
use crate::z85;

/// Accepts connections on `addr`, handshaking each one against `identity`
/// and handing the resulting [`Session`] to `handler`. Runs until the
/// listener errors; never returns on success.
///
/// `handler` is spawned as its own task per connection, so a slow or
/// misbehaving client cannot stall others.
///
/// # Errors
/// Returns an I/O error if binding the listener fails.
pub async fn run<F, Fut>(addr: &str, identity: Arc<CurveKeyPair>, handler: F) -> Result<()>
where
    F: Fn(Session<TcpStream>) -> Fut + Clone + 'static,
    Fut: Future<Output = ()> + 'static,
{
    run_with_config(addr, identity, Config::default(), handler).await
}

/// As [`run`], with an explicit [`Config`].
///
/// # Errors
/// Returns an I/O error if binding the listener fails.
pub async fn run_with_config<F, Fut>(
    addr: &str,
    identity: Arc<CurveKeyPair>,
    config: Config,
    handler: F,
) -> Result<()>
where
    F: Fn(Session<TcpStream>) -> Fut + Clone + 'static,
    Fut: Future<Output = ()> + 'static,
{
    let listener = TcpListener::bind(addr).await.map_err(CurveZmqError::Io)?;
    debug!(%addr, "server: listening");

    loop {
        let (stream, peer_addr) = listener.accept().await.map_err(CurveZmqError::Io)?;
        debug!(%peer_addr, "server: accepted connection");
        let identity = Arc::clone(&identity);
        let handler = handler.clone();
        let config = config.clone();
        compio::runtime::spawn(async move {
            if let Err(e) = handle_connection(stream, identity, config, handler).await {
                warn!(%peer_addr, error = %e, "connection failed");
            }
        })
        .detach();
    }
}

async fn handle_connection<F, Fut>(
    mut stream: TcpStream,
    identity: Arc<CurveKeyPair>,
    config: Config,
    handler: F,
) -> Result<()>
where
    F: Fn(Session<TcpStream>) -> Fut,
    Fut: Future<Output = ()>,
{
    // Announce our own long-term key as the `Identity` property, Z85-encoded,
    // so a client that already knows this server's verkey can confirm it
    // dialed the right peer (see `handshake::client::perform`'s check).
    let identity_property = z85::encode(identity.public.as_ref())?.into_bytes();

    let outcome = match config.handshake_timeout {
        Some(timeout) => compio::time::timeout(
            timeout,
            handshake::server::perform(&mut stream, &identity, "ROUTER", &identity_property),
        )
        .await
        .map_err(|_| CurveZmqError::HandshakeTimeout(timeout))??,
        None => handshake::server::perform(&mut stream, &identity, "ROUTER", &identity_property).await?,
    };
    debug!("server: handshake complete");

    let session = Session::with_read_buf_size(stream, outcome, true, config.max_frame_body_len, config.read_buf_size);
    handler(session).await;
    Ok(())
}
