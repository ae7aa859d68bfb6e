//! Sends one request and prints its reply, mirroring `test_client_request`
//! from the reference client/server demo.

use curvezmq::{CurveKeyPair, Verkey};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[compio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let addr = args.get(1).map(String::as_str).unwrap_or("127.0.0.1:5555");
    let verkey_text = args
        .get(2)
        .expect("usage: client_demo <host:port> <server-verkey-base58>");
    let server_verkey = Verkey::from_base58(verkey_text).expect("invalid verkey");

    let identity = CurveKeyPair::generate();
    let client = curvezmq::Client::connect(addr, &identity, &server_verkey)
        .await
        .expect("failed to connect");

    let request = json!({
        "reqId": 123,
        "identifier": "LibindyDid111111111111",
        "operation": {"data": 1, "ledgerId": 1, "type": "3"},
        "protocolVersion": 2,
    });
    let handle = client.request(&request).expect("failed to send request");
    let response = handle.result().await.expect("request failed");
    println!("{response}");
}
