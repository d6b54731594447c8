//! Listener and command sender over real loopback sockets

use cabinetlistener::{
    fleet, Cabinet, CabinetListener, CommandOptions, CommandSender, Iteration, ListenerOptions,
    ShelfOperation, TcpConnector,
};
use cabinetconfig::FleetConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn controller() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn fleet_conf(port: u16) -> FleetConfig {
    FleetConfig::parse(&format!(
        r#"
[listener]
cabinet_poll_timeout = 200ms

[cabinet.1]
name = Archive A
host = 127.0.0.1
port = {port}
checksum_offset = 0x0A

[shelf.1]
cabinet = 1
column = 2
open = true

[shelf.2]
cabinet = 1
column = 4
open = true
close_command = 68 04 09 02 04 0E
"#
    ))
    .unwrap()
}

#[tokio::test]
async fn test_listener_over_tcp() {
    let (server, port) = controller().await;
    let config = fleet_conf(port);
    let store = Arc::new(fleet::load_store(&config).unwrap());

    let mut listener = CabinetListener::new(
        ListenerOptions::from_config(&config),
        store.clone(),
        Arc::new(TcpConnector),
    );
    let mut events = listener.notifier().subscribe().await;

    let accept = tokio::spawn(async move {
        let (mut socket, _) = server.accept().await.unwrap();
        socket
            .write_all(&[0xFF, 0x68, 0x03, 0x08, 0x01, 0x02])
            .await
            .unwrap();
        socket
    });
    assert_eq!(listener.start().await.unwrap(), 1);
    let _socket = accept.await.unwrap();

    let mut frames = 0;
    for _ in 0..20 {
        if let Iteration::Processed { frames: n, .. } = listener.run_once().await {
            frames += n;
        }
        if frames > 0 {
            break;
        }
    }
    assert_eq!(frames, 1);

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((event.shelf_id, event.panel_id), (1, 2));
    assert!(!store.shelf(1).await.unwrap().is_open);
    assert!(store.shelf(2).await.unwrap().is_open);

    listener.shutdown().await;
    assert!(listener.registry().is_empty());
}

#[tokio::test]
async fn test_sender_over_tcp() {
    let (server, port) = controller().await;
    let config = fleet_conf(port);
    let store = Arc::new(fleet::load_store(&config).unwrap());
    let cabinet: Cabinet = store.cabinet(1).await.unwrap();
    let shelf = store.shelf(2).await.unwrap();

    let received = tokio::spawn(async move {
        let (mut socket, _) = server.accept().await.unwrap();
        let mut buf = vec![0u8; 12];
        socket.read_exact(&mut buf).await.unwrap();
        buf
    });

    let sender = CommandSender::new(
        CommandOptions::from_config(&config),
        Arc::new(TcpConnector),
        store.clone(),
    );
    sender.send_open_command(&cabinet, 11).await.unwrap();
    assert!(sender
        .send_shelf_command(&cabinet, &shelf, ShelfOperation::Close)
        .await
        .unwrap());

    assert_eq!(
        received.await.unwrap(),
        vec![0x68, 0x04, 0x09, 0x01, 0x0B, 0x15, 0x68, 0x04, 0x09, 0x02, 0x04, 0x0E]
    );
    assert!(store.cabinet(1).await.unwrap().last_seen.is_some());
    sender.close_all().await;
    assert_eq!(sender.pooled().await, 0);
}

#[tokio::test]
async fn test_probe_closed_port() {
    let (server, port) = controller().await;
    drop(server);

    let store = Arc::new(cabinetlistener::MemoryStore::new());
    let sender = CommandSender::new(CommandOptions::default(), Arc::new(TcpConnector), store);
    assert!(!sender.probe("127.0.0.1", port).await);
}
