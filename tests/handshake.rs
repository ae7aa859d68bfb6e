//! End-to-end handshake coverage: both sides of a real TCP loopback
//! connection driving `handshake::client`/`handshake::server` against each
//! other, then exercising the resulting `Session`s.

use curvezmq::crypto::CurveKeyPair;
use curvezmq::handshake;
use curvezmq::keys::LongTermKeyPair;
use curvezmq::session::Session;
use curvezmq::{CurveZmqError, Result};

async fn loopback() -> (compio::net::TcpStream, compio::net::TcpStream) {
    let listener = compio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = futures::join!(compio::net::TcpStream::connect(addr), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}

#[compio::test]
async fn test_handshake_round_trip_yields_sessions_that_talk_to_each_other() -> Result<()> {
    let (mut client_stream, mut server_stream) = loopback().await;

    let server_identity = LongTermKeyPair::generate();
    let server_verkey = server_identity.verkey();
    let client_identity = CurveKeyPair::generate();
    let server_pk = server_verkey.to_curve_public()?;

    let (client_outcome, server_outcome) = futures::join!(
        handshake::client::perform(&mut client_stream, &client_identity, &server_pk, "DEALER", b""),
        handshake::server::perform(&mut server_stream, &server_identity.curve, "ROUTER", b"whatever"),
    );
    let client_outcome = client_outcome?;
    let server_outcome = server_outcome?;

    assert_eq!(client_outcome.peer_identity_pk.as_bytes(), server_pk.as_bytes());
    assert_eq!(
        server_outcome.peer_identity_pk.as_bytes(),
        client_identity.public.as_bytes()
    );

    let mut client = Session::new(client_stream, client_outcome, false, 1 << 20);
    let mut server = Session::new(server_stream, server_outcome, true, 1 << 20);

    client.send(b"hello server").await?;
    let received = server.receive().await?.expect("connection stayed open");
    assert_eq!(&received[..], b"hello server");

    server.send(b"hello client").await?;
    let received = client.receive().await?.expect("connection stayed open");
    assert_eq!(&received[..], b"hello client");

    Ok(())
}

#[compio::test]
async fn test_a_client_dialing_the_wrong_server_key_never_completes_the_handshake() -> Result<()> {
    use std::time::Duration;

    let (mut client_stream, mut server_stream) = loopback().await;

    let server_identity = LongTermKeyPair::generate();
    let wrong_verkey = LongTermKeyPair::generate().verkey();
    let client_identity = CurveKeyPair::generate();
    let wrong_pk = wrong_verkey.to_curve_public()?;

    // The server rejects the mis-sealed HELLO outright and never replies, so
    // the client's read simply never completes rather than erroring out
    // with a distinguishing message (no oracle for a bad guess).
    let (client_result, server_result) = futures::join!(
        compio::time::timeout(
            Duration::from_millis(200),
            handshake::client::perform(&mut client_stream, &client_identity, &wrong_pk, "DEALER", b""),
        ),
        handshake::server::perform(&mut server_stream, &server_identity.curve, "ROUTER", b"id"),
    );

    assert!(client_result.is_err(), "client should never receive a WELCOME");
    assert!(matches!(server_result, Err(CurveZmqError::DecryptionError)));
    Ok(())
}
