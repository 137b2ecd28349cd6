use std::{sync::Arc, time::Duration};

use dsbox::{
    decode, encode, method, transport::tcp, Call, Context, Messenger, MessengerConfig,
    MethodTable, Msg, TcpConnector,
};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(5);

fn init_log() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn create_messenger(url: &str) -> Messenger {
    let config = MessengerConfig::new(url)
        .with_client_group(7)
        .with_retry_interval(Duration::from_millis(50))
        .expect("Can not create config");
    Messenger::new(config, Arc::new(TcpConnector))
}

fn serve_add(messenger: &Messenger) {
    messenger.add_in_box(0, "svcA").add_methods(MethodTable::new().with(
        "add",
        method(|_caller, args| async move {
            let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
            Ok::<_, String>(json!(sum))
        }),
    ));
}

#[tokio::test]
async fn call_over_tcp() {
    init_log();

    let server = create_messenger("tcp://127.0.0.1:47101");
    serve_add(&server);
    server.add_out_box(0, "c1", "tcp://127.0.0.1:47102");
    let listener = tcp::listen(server.url(), server.clone())
        .await
        .expect("Can not listen");

    let client = create_messenger("tcp://127.0.0.1:47102");
    let svc = client.add_out_box(0, "svcA", "tcp://127.0.0.1:47101");
    svc.add_methods(["add"]);

    for (args, expected) in [(vec![json!(2), json!(3)], 5), (vec![json!(10)], 10)] {
        let reply = svc.call("add", "c1", args).expect("Can not call");
        let value = timeout(WAIT, reply).await.expect("Call timed out");
        assert_eq!(value, Ok(json!(expected)));
    }

    listener.abort();
}

#[tokio::test]
async fn anonymous_client_gets_session() {
    init_log();

    let server = create_messenger("tcp://127.0.0.1:47111");
    serve_add(&server);
    let listener = tcp::listen(server.url(), server.clone())
        .await
        .expect("Can not listen");

    let stream = TcpStream::connect("127.0.0.1:47111")
        .await
        .expect("Can not connect");
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    writer.write_all(b"{}\n").await.expect("Can not send handshake");

    let line = timeout(WAIT, lines.next_line())
        .await
        .expect("No config in time")
        .expect("Can not read config")
        .expect("Server closed connection");
    let session = match &decode(&line).expect("Can not decode config")[..] {
        [config @ Msg::ConfigClient(_)] => config.receiver().to_owned(),
        other => panic!("unexpected batch {:?}", other),
    };
    assert_eq!(session, "0");
    assert_eq!(server.get_group(7).len(), 1);

    let call: Msg = Call::new("add", &session, "svcA", Context::new(), vec![json!(1), json!(2)]).into();
    let mut frame = encode(&[call]).expect("Can not encode call");
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await.expect("Can not send call");

    let line = timeout(WAIT, lines.next_line())
        .await
        .expect("No reply in time")
        .expect("Can not read reply")
        .expect("Server closed connection");
    match &decode(&line).expect("Can not decode reply")[..] {
        [Msg::Return(ret)] => assert_eq!(ret.value(), &json!(3)),
        other => panic!("unexpected batch {:?}", other),
    }

    listener.abort();
}
