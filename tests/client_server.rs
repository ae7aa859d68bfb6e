//! End-to-end coverage of the `Client`/`server::run` pair: the request/
//! REQACK/REPLY happy path, and the in-flight duplicate-`reqId` guard.

use std::sync::Arc;
use std::time::Duration;

use curvezmq::crypto::CurveKeyPair;
use curvezmq::keys::LongTermKeyPair;
use curvezmq::session::Session;
use curvezmq::{CurveZmqError, Result};
use serde_json::{json, Value};

async fn echo_handler(mut session: Session<compio::net::TcpStream>) {
    loop {
        let message = match session.receive().await {
            Ok(Some(bytes)) => bytes,
            _ => break,
        };
        let request: Value = match serde_json::from_slice(&message) {
            Ok(v) => v,
            Err(_) => break,
        };
        let req_id = request.get("reqId").cloned().unwrap_or(json!(null));

        let ack = json!({"op": "REQACK", "reqId": req_id});
        if session.send(&serde_json::to_vec(&ack).unwrap()).await.is_err() {
            break;
        }

        let reply = json!({"op": "REPLY", "result": {"reqId": req_id, "echo": request.get("operation")}});
        if session.send(&serde_json::to_vec(&reply).unwrap()).await.is_err() {
            break;
        }
    }
}

#[compio::test]
async fn test_request_reply_round_trip_through_client_and_server() -> Result<()> {
    let server_identity = LongTermKeyPair::generate();
    let server_verkey = server_identity.verkey();
    let listener = compio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener); // only used to pick a free port; `server::run*` binds it itself

    let server_identity_arc = Arc::new(server_identity.curve);
    compio::runtime::spawn(async move {
        let _ = curvezmq::server::run_with_config(
            &addr.to_string(),
            server_identity_arc,
            curvezmq::config::Config::default().with_handshake_timeout(Some(Duration::from_secs(5))),
            echo_handler,
        )
        .await;
    })
    .detach();
    // run_with_config binds before accepting; give the listener a moment.
    compio::time::sleep(Duration::from_millis(20)).await;

    let client_identity = CurveKeyPair::generate();
    let client = curvezmq::Client::connect(&addr.to_string(), &client_identity, &server_verkey).await?;

    let request = json!({"reqId": 1, "operation": {"type": "noop"}});
    let handle = client.request(&request)?;
    let response = handle.result().await?;
    assert_eq!(response["reqId"], json!(1));
    assert_eq!(response["echo"], json!({"type": "noop"}));

    Ok(())
}

#[compio::test]
async fn test_a_duplicate_req_id_is_rejected_before_the_first_resolves() -> Result<()> {
    // A handler that completes the handshake and then goes silent, so the
    // first request's reply never arrives and the entry stays pending.
    async fn silent_handler(_session: Session<compio::net::TcpStream>) {
        std::future::pending::<()>().await;
    }

    let server_identity = LongTermKeyPair::generate();
    let server_verkey = server_identity.verkey();
    let listener = compio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener); // only used to pick a free port; `server::run*` binds it itself

    let server_identity_arc = Arc::new(server_identity.curve);
    compio::runtime::spawn(async move {
        let _ = curvezmq::server::run(&addr.to_string(), server_identity_arc, silent_handler).await;
    })
    .detach();
    compio::time::sleep(Duration::from_millis(20)).await;

    let client_identity = CurveKeyPair::generate();
    let client = curvezmq::Client::connect(&addr.to_string(), &client_identity, &server_verkey).await?;

    let request = json!({"reqId": "dup-1", "operation": {"type": "noop"}});
    let _first = client.request(&request)?;
    let err = client.request(&request).unwrap_err();
    assert!(matches!(err, CurveZmqError::DuplicateReqId(id) if id == "dup-1"));

    Ok(())
}
