//! Calculator server.

use std::sync::Arc;

use dsbox::{method, transport::tcp, Messenger, MessengerConfig, MethodTable, TcpConnector};
use serde_json::{json, Value};

/// Accepts arguments from the command line.
/// * listen_port
/// * client_port
#[tokio::main]
async fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .init();

    // Parse command line arguments.
    let args = std::env::args().collect::<Vec<String>>();
    if args.len() < 3 {
        println!("Usage: {} <listen_port> <client_port>", args[0]);
        return;
    }
    let listen_port = args[1].parse::<u16>().expect("Can not parse listen port");
    let client_port = args[2].parse::<u16>().expect("Can not parse client port");

    // Create messenger.
    let config = MessengerConfig::new(format!("tcp://127.0.0.1:{}", listen_port));
    let messenger = Messenger::new(config, Arc::new(TcpConnector));

    // Serve calculator and register the box of the client.
    messenger.add_in_box(0, "calc").add_methods(MethodTable::new().with(
        "add",
        method(|caller, args| async move {
            let sum = add(&args);
            println!("{} asks for sum of {}", caller, Value::from(args));
            sum.map(|sum| json!(sum))
        }),
    ));
    messenger.add_out_box(0, "client", &format!("tcp://127.0.0.1:{}", client_port));

    // Run until killed.
    let listener = tcp::listen(messenger.url(), messenger.clone())
        .await
        .expect("Can not listen");
    listener.await.expect("Listener failed");
}

/// Sum of integer arguments.
fn add(args: &[Value]) -> Result<i64, String> {
    let mut sum: i64 = 0;
    for arg in args {
        let x = arg
            .as_i64()
            .ok_or_else(|| format!("not a number: {}", arg))?;
        sum = sum.checked_add(x).ok_or_else(|| "overflow".to_owned())?;
    }
    Ok(sum)
}
