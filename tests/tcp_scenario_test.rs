//! End-to-end TCP scenarios over loopback: the two-client message storm,
//! close idempotence, and connect failure surfacing.

mod common;

use std::time::Duration;

use common::{loopback_client_config, loopback_server_config, wait_until, ClientProbe, RecordingListener};
use wireflow::{Client, LineCodec, SessionManager};

#[test]
fn two_clients_thousand_messages_each_in_order() {
    let listener = RecordingListener::new();
    let manager = SessionManager::new(
        loopback_server_config("storm"),
        LineCodec::new(),
        listener.clone(),
    );
    manager.start().unwrap();
    let port = manager.local_addr().unwrap().port();

    let client1 = Client::tcp(
        loopback_client_config("storm-c1", port),
        LineCodec::new(),
        ClientProbe::new(),
    );
    let client2 = Client::tcp(
        loopback_client_config("storm-c2", port),
        LineCodec::new(),
        ClientProbe::new(),
    );
    client1.connect().unwrap();
    client2.connect().unwrap();
    assert!(client1.is_connected());
    assert!(client2.is_connected());

    for i in 0..1000 {
        client1.send(&format!("c1-{i:04}")).unwrap();
        client2.send(&format!("c2-{i:04}")).unwrap();
    }

    assert!(
        wait_until(Duration::from_secs(20), || listener.total_messages() == 2000),
        "expected 2000 messages, got {}",
        listener.total_messages()
    );
    assert_eq!(manager.live_session_count(), 2);
    assert_eq!(manager.messages_received(), 2000);

    // exactly once, in per-connection order
    let mut seen = 0;
    for id in listener.session_ids() {
        let messages = listener.messages_for(&id);
        assert_eq!(messages.len(), 1000);
        let prefix = &messages[0][..3];
        let expected: Vec<String> = (0..1000).map(|i| format!("{prefix}{i:04}")).collect();
        assert_eq!(messages, expected);
        seen += messages.len();
    }
    assert_eq!(seen, 2000);

    client1.close();
    client2.close();
    assert!(
        wait_until(Duration::from_secs(10), || manager.live_session_count() == 0),
        "live session count should return to 0, got {}",
        manager.live_session_count()
    );
    assert!(wait_until(Duration::from_secs(2), || listener.after_closed() == 2));

    manager.stop();
}

#[test]
fn close_is_idempotent_and_fires_after_close_once() {
    let listener = RecordingListener::new();
    let manager = SessionManager::new(
        loopback_server_config("idem"),
        LineCodec::new(),
        listener.clone(),
    );
    manager.start().unwrap();
    let port = manager.local_addr().unwrap().port();

    let probe = ClientProbe::new();
    let client = Client::tcp(
        loopback_client_config("idem-c", port),
        LineCodec::new(),
        probe.clone(),
    );
    client.connect().unwrap();
    let session = client.session().unwrap();

    // any number of close calls leaves the session closed with the
    // after-close callback delivered exactly once
    session.close();
    session.close();
    session.close();

    assert!(wait_until(Duration::from_secs(5), || session.is_closed()));
    assert!(wait_until(Duration::from_secs(5), || probe.after_closed() >= 1));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(probe.after_closed(), 1);
    assert_eq!(probe.before_closed(), 1);

    session.close();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(probe.after_closed(), 1);

    assert!(wait_until(Duration::from_secs(5), || {
        manager.live_session_count() == 0
    }));

    client.close();
    manager.stop();
}

#[test]
fn server_side_close_via_manager_is_idempotent_too() {
    let listener = RecordingListener::new();
    let manager = SessionManager::new(
        loopback_server_config("srv-close"),
        LineCodec::new(),
        listener.clone(),
    );
    manager.start().unwrap();
    let port = manager.local_addr().unwrap().port();

    let client = Client::tcp(
        loopback_client_config("srv-close-c", port),
        LineCodec::new(),
        ClientProbe::new(),
    );
    client.connect().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        manager.live_session_count() == 1
    }));
    let wrapper = manager.sessions().pop().unwrap();
    let id = *wrapper.id();

    assert!(manager.close_session(&id));
    manager.close_session(&id);
    wrapper.session().close();

    assert!(wait_until(Duration::from_secs(5), || {
        manager.live_session_count() == 0
    }));
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(listener.after_closed(), 1);

    client.close();
    manager.stop();
}

#[test]
fn connect_to_dead_port_fails() {
    // bind-then-drop yields a port with nothing listening
    let port = {
        let sock = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        sock.local_addr().unwrap().port()
    };
    let mut config = loopback_client_config("dead", port);
    config.connection_timeout_ms = 1500;
    let client = Client::tcp(config, LineCodec::new(), ClientProbe::new());
    assert!(client.connect().is_err());
    assert!(!client.is_connected());
    client.close();
}

#[test]
fn send_without_connection_is_not_connected() {
    let client = Client::tcp(
        loopback_client_config("never", 1),
        LineCodec::new(),
        ClientProbe::new(),
    );
    assert!(matches!(
        client.send(&"hello".to_string()),
        Err(wireflow::Error::NotConnected)
    ));
}
