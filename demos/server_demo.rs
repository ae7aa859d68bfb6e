//! Runs a ROUTER accept loop that ACKs then replies to every request,
//! mirroring `test_server_handler` from the reference client/server demo.

use std::sync::Arc;

use curvezmq::{LongTermKeyPair, Session};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[compio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let addr = args.get(1).map(String::as_str).unwrap_or("127.0.0.1:5555");

    let identity = LongTermKeyPair::generate();
    println!("server ident: {}", identity.verkey().to_base58());

    curvezmq::server::run(addr, Arc::new(identity.curve), handle_connection)
        .await
        .expect("accept loop failed");
}

async fn handle_connection(mut session: Session<compio::net::TcpStream>) {
    loop {
        let message = match session.receive().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "connection error");
                break;
            }
        };

        let request: Value = match serde_json::from_slice(&message) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                break;
            }
        };
        let req_id = request.get("reqId").cloned().unwrap_or(json!(1));

        let ack = json!({"op": "REQACK", "reqId": req_id});
        if session.send(&serde_json::to_vec(&ack).unwrap()).await.is_err() {
            break;
        }

        let reply = json!({"op": "REPLY", "result": {"reqId": req_id}});
        if session.send(&serde_json::to_vec(&reply).unwrap()).await.is_err() {
            break;
        }
    }
}
