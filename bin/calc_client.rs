//! Calculator client.

use std::sync::Arc;

use dsbox::{transport::tcp, Messenger, MessengerConfig, TcpConnector};
use serde_json::json;

/// Accepts arguments from the command line.
/// * listen_port
/// * server_port
#[tokio::main]
async fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .init();

    // Parse command line arguments.
    let args = std::env::args().collect::<Vec<String>>();
    if args.len() < 3 {
        println!("Usage: {} <listen_port> <server_port>", args[0]);
        return;
    }
    let listen_port = args[1].parse::<u16>().expect("Can not parse listen port");
    let server_port = args[2].parse::<u16>().expect("Can not parse server port");

    // Create messenger and accept connections from the server.
    let config = MessengerConfig::new(format!("tcp://127.0.0.1:{}", listen_port));
    let messenger = Messenger::new(config, Arc::new(TcpConnector));
    let listener = tcp::listen(messenger.url(), messenger.clone())
        .await
        .expect("Can not listen");

    // Register the remote calculator.
    let calc = messenger.add_out_box(0, "calc", &format!("tcp://127.0.0.1:{}", server_port));
    calc.add_methods(["add"]);

    // Call is buffered and retried until the server is up.
    let sum = calc
        .call("add", "client", vec![json!(2), json!(3)])
        .expect("Calculator has no add")
        .await;
    match sum {
        Ok(value) => println!("2 + 3 = {}", value),
        Err(info) => println!("Call failed: {}", info),
    }

    listener.abort();
}
