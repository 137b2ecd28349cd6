use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use dsbox::{method, CallError, MemoryNetwork, Messenger, MessengerConfig, MethodTable};
use serde_json::{json, Value};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn init_log() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn create_messenger(network: &MemoryNetwork, url: &str) -> Messenger {
    let config = MessengerConfig::new(url)
        .with_retry_interval(Duration::from_millis(50))
        .expect("Can not create config");
    Messenger::new(config, network.connector())
}

/// Server at `mem://a` with in-box `svcA` and out-box of the caller `c1` at `mem://b`.
fn create_server(network: &MemoryNetwork, served: Arc<AtomicUsize>) -> Messenger {
    let server = create_messenger(network, "mem://a");
    server.add_in_box(0, "svcA").add_methods(MethodTable::new().with(
        "add",
        method(move |_caller, args| {
            served.fetch_add(1, Ordering::SeqCst);
            async move {
                match (args.first().and_then(Value::as_i64), args.get(1).and_then(Value::as_i64)) {
                    (Some(x), Some(y)) => Ok(json!(x + y)),
                    _ => Err("bad args".to_owned()),
                }
            }
        }),
    ));
    server.add_out_box(0, "c1", "mem://b");
    server
}

#[tokio::test]
async fn call_is_answered() {
    init_log();

    let network = MemoryNetwork::new();
    let served = Arc::new(AtomicUsize::new(0));
    let server = create_server(&network, served.clone());
    network.bind("mem://a", &server);

    let client = create_messenger(&network, "mem://b");
    network.bind("mem://b", &client);
    let svc = client.add_out_box(0, "svcA", "mem://a");
    svc.add_methods(["add"]);

    let sum = timeout(WAIT, svc.call("add", "c1", vec![json!(2), json!(3)]).expect("Can not call"))
        .await
        .expect("Call timed out");
    assert_eq!(sum, Ok(json!(5)));

    let rejected = timeout(WAIT, svc.call("add", "c1", vec![json!("x")]).expect("Can not call"))
        .await
        .expect("Call timed out");
    assert_eq!(rejected, Err(CallError::Failed("bad args".to_owned())));

    assert_eq!(served.load(Ordering::SeqCst), 2);
    assert_eq!(svc.pending_calls(), 0);
}

#[tokio::test]
async fn call_waits_for_server() {
    init_log();

    let network = MemoryNetwork::new();
    let client = create_messenger(&network, "mem://b");
    network.bind("mem://b", &client);
    let svc = client.add_out_box(0, "svcA", "mem://a");
    svc.add_methods(["add"]);

    let reply = svc.call("add", "c1", vec![json!(20), json!(22)]).expect("Can not call");
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(svc.buffered(), 1);

    let served = Arc::new(AtomicUsize::new(0));
    let server = create_server(&network, served.clone());
    network.bind("mem://a", &server);

    let sum = timeout(WAIT, reply).await.expect("Call timed out");
    assert_eq!(sum, Ok(json!(42)));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(served.load(Ordering::SeqCst), 1);
    assert_eq!(svc.buffered(), 0);
}

#[tokio::test]
async fn dropped_box_rejects_waiting_call() {
    init_log();

    let network = MemoryNetwork::new();
    let client = create_messenger(&network, "mem://b");
    let svc = client.add_out_box(0, "svcA", "mem://a");
    svc.add_methods(["add"]);

    let reply = svc.call("add", "c1", vec![]).expect("Can not call");
    client.drop_box(&svc.clone().into());

    assert_eq!(timeout(WAIT, reply).await.expect("Call timed out"), Err(CallError::Dropped));
    assert!(client.get_box("svcA").is_none());
}
