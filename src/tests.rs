use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::json;

use crate::{
    common::{
        format::{decode, encode},
        handler::{notify, NotifyTable},
        message::{Context, Msg, Notify, Return},
    },
    transport::{
        mock::{MockConnection, MockConnector},
        Connection, ConnectionState,
    },
    Call, CallError, Messenger, MessengerConfig, PoolError,
};

fn messenger(connector: &Arc<MockConnector>) -> Messenger {
    let config = MessengerConfig::new("mock://self")
        .with_client_group(9)
        .with_retry_interval(Duration::from_millis(50))
        .expect("Can not create config");
    Messenger::new(config, connector.clone())
}

fn names(boxes: Vec<crate::MethodBox>) -> HashSet<String> {
    boxes.iter().map(|b| b.name().to_owned()).collect()
}

#[test]
pub fn test_config() {
    let config = MessengerConfig::new("tcp://127.0.0.1:4000");
    assert_eq!(config.url(), "tcp://127.0.0.1:4000");
    assert_eq!(config.client_group(), MessengerConfig::DEFAULT_CLIENT_GROUP);
    assert_eq!(config.retry_interval(), Duration::from_secs(1));

    assert!(config.with_retry_interval(Duration::ZERO).is_err());
}

////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn groups_are_exact() {
    let connector = MockConnector::new();
    let messenger = messenger(&connector);
    messenger.add_in_box(1, "a");
    messenger.add_out_box(1, "b", "mock://b");
    messenger.add_in_box(2, "c");

    assert_eq!(
        names(messenger.get_group(1)),
        HashSet::from(["a".to_owned(), "b".to_owned()])
    );
    assert_eq!(names(messenger.get_group(2)), HashSet::from(["c".to_owned()]));
    assert!(messenger.get_group(3).is_empty());
}

#[tokio::test]
async fn drop_box_is_idempotent() {
    let connector = MockConnector::new();
    let messenger = messenger(&connector);
    let in_box = messenger.add_in_box(1, "a");

    messenger.drop_box(&in_box.clone().into());
    assert!(messenger.get_box("a").is_none());
    messenger.drop_box(&in_box.into());
    assert!(messenger.get_box("a").is_none());

    // Stale handle does not drop the box registered later.
    let stale = messenger.add_out_box(1, "b", "mock://b");
    let fresh = messenger.add_out_box(1, "b", "mock://b");
    messenger.drop_box(&stale.into());
    assert!(messenger
        .get_box("b")
        .is_some_and(|current| current.ptr_eq(&fresh.into())));
}

#[tokio::test]
async fn replaced_box_is_released() {
    let connector = MockConnector::new();
    connector.set_initial_state(ConnectionState::Connecting);
    let messenger = messenger(&connector);
    let old = messenger.add_out_box(1, "b", "mock://b");
    old.add_methods(["add"]);

    let pending = old.call("add", "c1", vec![]).expect("Can not call");
    messenger.add_in_box(1, "b");

    assert_eq!(pending.await, Err(CallError::Dropped));
    assert!(messenger
        .get_box("b")
        .is_some_and(|current| current.as_in_box().is_some()));
}

#[tokio::test]
async fn hooks_see_boxes() {
    let connector = MockConnector::new();
    let messenger = messenger(&connector);
    let events = Arc::new(Mutex::new(Vec::new()));

    let added = events.clone();
    messenger.set_on_after_box_in(move |mbox| {
        added.lock().unwrap().push(format!("in {}", mbox.name()))
    });
    let removed = events.clone();
    messenger.set_on_before_box_out(move |mbox| {
        removed.lock().unwrap().push(format!("out {}", mbox.name()))
    });

    let in_box = messenger.add_in_box(1, "a");
    messenger.add_out_box(1, "b", "mock://b");
    messenger.drop_box(&in_box.into());
    messenger.drop_box(&messenger.add_in_box(2, "c").into());

    assert_eq!(
        *events.lock().unwrap(),
        vec!["in a", "in b", "out a", "in c", "out c"]
    );
}

#[tokio::test]
async fn misrouted_envelopes_are_dropped() {
    let connector = MockConnector::new();
    let messenger = messenger(&connector);
    messenger.add_in_box(1, "local");

    let call = Call::new("add", "nobody", "missing", Context::new(), vec![]);
    messenger.from_inside(call.clone().into());
    messenger.from_outside(Return::new(&call, json!(1)).into());

    // Remote envelope must come through an out-box.
    let call = Call::new("add", "local", "c1", Context::new(), vec![]);
    messenger.from_outside(call.into());

    assert!(connector.dialed().is_empty());
    assert!(messenger.get_box("local").is_some());
}

////////////////////////////////////////////////////////////////////////////////

#[tokio::test]
async fn anonymous_sessions_get_config() {
    let connector = MockConnector::new();
    let messenger = messenger(&connector);

    let first = MockConnection::new(ConnectionState::Open);
    let second = MockConnection::new(ConnectionState::Open);
    messenger.accept(first.clone(), None);
    messenger.accept(second.clone(), None);

    assert_eq!(
        names(messenger.get_group(9)),
        HashSet::from(["0".to_owned(), "1".to_owned()])
    );
    for (conn, session) in [(&first, "0"), (&second, "1")] {
        let frames = conn.sent();
        assert_eq!(frames.len(), 1);
        match &decode(&frames[0]).expect("Can not decode frame")[..] {
            [msg @ Msg::ConfigClient(_)] => {
                assert_eq!(msg.receiver(), session);
                assert_eq!(msg.sender(), "");
                assert_eq!(msg.method(), "");
            }
            other => panic!("unexpected batch {:?}", other),
        }
    }
    assert!(connector.dialed().is_empty());
}

#[tokio::test]
async fn named_connection_routes_frames() {
    let connector = MockConnector::new();
    let messenger = messenger(&connector);
    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = heard.clone();
    messenger.add_in_box(1, "local").add_notifies(NotifyTable::new().with(
        "tick",
        notify(move |talker, args| sink.lock().unwrap().push((talker.to_owned(), args))),
    ));
    messenger.add_out_box(1, "svcB", "mock://peer");

    let conn = MockConnection::new(ConnectionState::Open);
    messenger.accept(conn.clone(), Some("mock://peer".to_owned()));
    assert!(messenger.get_group(9).is_empty());

    conn.push("garbage".to_owned());
    let tick: Msg = Notify::new("tick", "svcB", "local", Context::new(), vec![json!(1)]).into();
    conn.push(encode(&[tick]).expect("Can not encode"));

    assert_eq!(
        *heard.lock().unwrap(),
        vec![("svcB".to_owned(), vec![json!(1)])]
    );

    // Accepted connection is reused for the address.
    messenger
        .get_box("svcB")
        .and_then(|b| b.as_out_box().cloned())
        .expect("No out-box")
        .add_notifies(["tock"]);
    messenger
        .get_box("svcB")
        .expect("No box")
        .notify("tock", "local", vec![])
        .expect("Can not notify");
    assert!(connector.dialed().is_empty());
    assert_eq!(conn.sent().len(), 1);
}

#[tokio::test]
async fn pool_connections() {
    let connector = MockConnector::new();
    let messenger = messenger(&connector);
    let pool = messenger.pool();

    assert!(matches!(
        pool.get_connection("7"),
        Err(PoolError::NotDialable(address)) if address == "7"
    ));

    let dialed = pool.get_connection("mock://a").expect("Can not dial");
    let again = pool.get_connection("mock://a").expect("Can not dial");
    assert!(Arc::ptr_eq(&dialed, &again));
    let (address, identity, _) = connector.dialed().remove(0);
    assert_eq!(address, "mock://a");
    assert_eq!(identity.as_deref(), Some("mock://self"));

    // Replacement closes the old connection.
    let replacement = MockConnection::new(ConnectionState::Open);
    pool.set_connection("mock://a", replacement.clone());
    assert_eq!(dialed.state(), ConnectionState::Closed);
    assert_eq!(
        pool.connection("mock://a").map(|conn| conn.state()),
        Some(ConnectionState::Open)
    );

    // Closed connection is not registered.
    let closed = MockConnection::new(ConnectionState::Closed);
    pool.set_connection("mock://a", closed);
    assert_eq!(replacement.state(), ConnectionState::Open);

    pool.delete_connection("mock://a");
    assert_eq!(replacement.state(), ConnectionState::Closed);
    assert!(pool.connection("mock://a").is_none());

    // Dead connection is dialed again.
    pool.get_connection("mock://a").expect("Can not dial");
    assert_eq!(connector.dialed().len(), 2);
}
