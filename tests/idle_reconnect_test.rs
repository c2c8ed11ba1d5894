//! Idle eviction and the client-side reconnect service, over loopback.

mod common;

use std::time::Duration;

use common::{loopback_client_config, loopback_server_config, wait_until, ClientProbe, RecordingListener};
use wireflow::{Client, LineCodec, SessionManager};

#[test]
fn idle_session_is_evicted_and_closed() {
    let listener = RecordingListener::new();
    let mut config = loopback_server_config("idle");
    config.idle_timeout_ms = 400;
    let manager = SessionManager::new(config, LineCodec::new(), listener.clone());
    manager.start().unwrap();
    let port = manager.local_addr().unwrap().port();

    let probe = ClientProbe::new();
    let client = Client::tcp(
        loopback_client_config("idle-c", port),
        LineCodec::new(),
        probe.clone(),
    );
    client.connect().unwrap();
    client.send(&"only one".to_string()).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        manager.live_session_count() == 1
    }));

    // no traffic past the timeout: the next sweep evicts and closes it
    assert!(
        wait_until(Duration::from_secs(5), || manager.live_session_count() == 0),
        "idle session should be evicted"
    );
    assert!(wait_until(Duration::from_secs(2), || listener.idle_removed() == 1));

    // the server-side close reaches the client as EOF
    assert!(wait_until(Duration::from_secs(5), || probe.after_closed() == 1));

    client.close();
    manager.stop();
}

#[test]
fn touched_session_is_retained() {
    let listener = RecordingListener::new();
    let mut config = loopback_server_config("retain");
    config.idle_timeout_ms = 600;
    let manager = SessionManager::new(config, LineCodec::new(), listener.clone());
    manager.start().unwrap();
    let port = manager.local_addr().unwrap().port();

    let client = Client::tcp(
        loopback_client_config("retain-c", port),
        LineCodec::new(),
        ClientProbe::new(),
    );
    client.connect().unwrap();

    // keep touching well inside the timeout window across several sweeps
    for i in 0..16 {
        client.send(&format!("keepalive-{i}")).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(
            manager.live_session_count(),
            1,
            "touched session must not be evicted"
        );
    }
    assert_eq!(listener.idle_removed(), 0);

    client.close();
    manager.stop();
}

#[test]
fn reconnect_service_repairs_a_dropped_connection() {
    let listener = RecordingListener::new();
    let manager = SessionManager::new(
        loopback_server_config("recon"),
        LineCodec::new(),
        listener.clone(),
    );
    manager.start().unwrap();
    let addr = manager.local_addr().unwrap();

    let probe = ClientProbe::new();
    let mut config = loopback_client_config("recon-c", addr.port());
    config.reconnect_interval_ms = 200;
    let client = Client::tcp(config, LineCodec::new(), probe.clone());
    client.connect().unwrap();
    assert_eq!(probe.connected(), 1);

    // drop the server; the client observes the close
    manager.stop();
    assert!(wait_until(Duration::from_secs(5), || !client.is_connected()));

    // bring a server back on the same port; the reconnect loop needs two
    // consecutive disconnected observations before acting
    let mut server_config = loopback_server_config("recon2");
    server_config.port = addr.port();
    let listener2 = RecordingListener::new();
    let manager2 = SessionManager::new(server_config, LineCodec::new(), listener2.clone());
    manager2.start().unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || client.is_connected()),
        "reconnect service should re-establish the connection"
    );
    assert!(probe.connected() >= 2);
    assert!(wait_until(Duration::from_secs(5), || {
        manager2.live_session_count() == 1
    }));

    client.send(&"back".to_string()).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        listener2.total_messages() == 1
    }));

    client.close();
    manager2.stop();
}

#[test]
fn heartbeat_keeps_an_idle_session_alive() {
    let listener = RecordingListener::new();
    let mut config = loopback_server_config("hb");
    config.idle_timeout_ms = 700;
    let manager = SessionManager::new(config, LineCodec::new(), listener.clone());
    manager.start().unwrap();
    let port = manager.local_addr().unwrap().port();

    let mut client_config = loopback_client_config("hb-c", port);
    client_config.heartbeat_interval_ms = 200;
    let client = Client::tcp(client_config, LineCodec::new(), ClientProbe::new());
    client.set_heartbeat_message(&"0".to_string()).unwrap();
    client.connect().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        manager.live_session_count() == 1
    }));

    // the application sends nothing, only heartbeats flow
    std::thread::sleep(Duration::from_secs(3));
    assert_eq!(manager.live_session_count(), 1);
    assert_eq!(listener.idle_removed(), 0);
    assert!(manager.messages_received() >= 5);

    client.close();
    manager.stop();
}
