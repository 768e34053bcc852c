//! End-to-end behavior of the name service over a real socket

mod common;

use common::{exchange_raw, read_all, TestServer};
use mqnamed::mailbox::{MailboxKey, ProbeKind, ANY_TAG, REQUEST_TAG};
use mqnamed::protocol::{encode_command, Command, Reply, Status, RESERVED_OPEN_CODE};
use mqnamed::transport::Connector;
use mqnamed::QueueHandle;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};

#[tokio::test]
async fn test_add_then_find_returns_handle() {
    let server = TestServer::start().await;
    let queue = server.broker.create(MailboxKey::Private).unwrap();
    let client = server.client();

    let added = client.add("printer1", queue.handle()).await.unwrap();
    assert_eq!(added.status, Status::OkAdd);

    let found = client.find("printer1").await.unwrap();
    assert_eq!(found, Reply::found(queue.handle()));
    assert_eq!(server.requests_handled(), 2);

    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_add_keeps_first_mapping() {
    let server = TestServer::start().await;
    let first = server.broker.create(MailboxKey::Private).unwrap();
    let second = server.broker.create(MailboxKey::Private).unwrap();
    let client = server.client();

    assert_eq!(client.add("printer1", first.handle()).await.unwrap().status, Status::OkAdd);
    assert_eq!(
        client.add("printer1", second.handle()).await.unwrap().status,
        Status::PortExists
    );
    assert_eq!(
        client.find("printer1").await.unwrap(),
        Reply::found(first.handle())
    );

    server.stop().await;
}

#[tokio::test]
async fn test_add_with_dead_handle_is_rejected() {
    let server = TestServer::start().await;
    let client = server.client();

    let reply = client.add("ghost", QueueHandle::new(999_999)).await.unwrap();
    assert_eq!(reply.status, Status::QueueNotExists);
    assert_eq!(
        client.find("ghost").await.unwrap().status,
        Status::PortNotSubscribed
    );

    server.stop().await;
}

#[tokio::test]
async fn test_remove_then_find_and_unknown_names() {
    let server = TestServer::start().await;
    let queue = server.broker.create(MailboxKey::Private).unwrap();
    let client = server.client();

    client.add("printer1", queue.handle()).await.unwrap();
    assert_eq!(client.remove("printer1").await.unwrap().status, Status::OkRemove);
    assert_eq!(
        client.find("printer1").await.unwrap().status,
        Status::PortNotSubscribed
    );

    for _ in 0..2 {
        assert_eq!(
            client.remove("printer1").await.unwrap().status,
            Status::PortNotSubscribed
        );
        assert_eq!(
            client.find("never-added").await.unwrap().status,
            Status::PortNotSubscribed
        );
    }

    server.stop().await;
}

#[tokio::test]
async fn test_wire_bytes_of_find_reply() {
    let server = TestServer::start().await;
    let queue = server.broker.create(MailboxKey::Private).unwrap();
    server.client().add("q", queue.handle()).await.unwrap();

    let bytes = exchange_raw(&server.addr, b"CMD_FIND_MSGQUEUE\nq\n").await;
    let mut expected = b"OK_FIND_MSGQUEUE\n".to_vec();
    expected.extend_from_slice(&queue.handle().get().to_be_bytes());
    assert_eq!(bytes, expected);

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_commands_only_close_their_own_connections() {
    let server = TestServer::start().await;
    let queue = server.broker.create(MailboxKey::Private).unwrap();
    let client = server.client();
    client.add("printer1", queue.handle()).await.unwrap();

    // A command token with no name yet, and an Add cut off inside its id.
    let mut nameless = Connector::connect(&server.addr).await.unwrap();
    nameless.write_all(b"CMD_FIND_MSGQUEUE\n").await.unwrap();
    let mut truncated = Connector::connect(&server.addr).await.unwrap();
    truncated
        .write_all(b"CMD_ADD_MSGQUEUE\nprinter2\n\x00\x00")
        .await
        .unwrap();
    // An empty name fails as soon as it is read.
    let mut empty_name = Connector::connect(&server.addr).await.unwrap();
    empty_name.write_all(b"CMD_FIND_MSGQUEUE\n\n").await.unwrap();

    assert_eq!(
        client.find("printer1").await.unwrap(),
        Reply::found(queue.handle())
    );
    assert!(read_all(&mut empty_name).await.is_empty());

    for conn in [&mut nameless, &mut truncated] {
        conn.shutdown().await.unwrap();
        assert!(read_all(conn).await.is_empty());
    }
    assert_eq!(
        client.find("printer2").await.unwrap().status,
        Status::PortNotSubscribed
    );
    assert_eq!(server.requests_handled(), 3);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_command_token_closes_without_reply() {
    let server = TestServer::start().await;

    let bytes = exchange_raw(&server.addr, b"CMD_OPEN_MSGQUEUE\nprinter1\n").await;
    assert!(bytes.is_empty());
    assert_eq!(server.requests_handled(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let server = TestServer::start_with_timeout(Duration::from_millis(200)).await;

    let conn = Connector::connect(&server.addr).await.unwrap();
    let mut reader = BufReader::new(conn);
    let bytes = read_all(&mut reader).await;

    assert_eq!(bytes, b"ERROR_TIMEOUT\n");
    assert_eq!(server.requests_handled(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_partial_command_times_out() {
    let server = TestServer::start_with_timeout(Duration::from_millis(200)).await;

    let mut conn = Connector::connect(&server.addr).await.unwrap();
    conn.write_all(b"CMD_FIND_MSGQUEUE\n").await.unwrap();
    let bytes = read_all(&mut conn).await;

    assert_eq!(bytes, b"ERROR_TIMEOUT\n");
    assert_eq!(server.requests_handled(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_unrecognized_internal_code_is_acknowledged() {
    let server = TestServer::start().await;
    let reply_box = server.broker.create(MailboxKey::Private).unwrap();

    let mut payload = reply_box.handle().get().to_be_bytes().to_vec();
    payload.extend_from_slice(&RESERVED_OPEN_CODE.to_be_bytes());
    payload.extend_from_slice(&[0, 8]);
    payload.extend_from_slice(b"printer1");
    server
        .broker
        .send_to(server.core, &payload, REQUEST_TAG)
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), reply_box.receive(64, ANY_TAG))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.payload, b"MSG_OK\n");
    assert_eq!(server.requests_handled(), 0);
    assert_eq!(
        server.client().find("printer1").await.unwrap().status,
        Status::PortNotSubscribed
    );

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients_are_all_served() {
    let server = TestServer::start().await;
    let queues: Vec<_> = (0..8)
        .map(|_| server.broker.create(MailboxKey::Private).unwrap())
        .collect();

    let mut tasks = Vec::new();
    for (i, queue) in queues.iter().enumerate() {
        let client = server.client();
        let handle = queue.handle();
        tasks.push(tokio::spawn(async move {
            client.add(&format!("queue-{i}"), handle).await.unwrap()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().status, Status::OkAdd);
    }

    for (i, queue) in queues.iter().enumerate() {
        let found = server.client().find(&format!("queue-{i}")).await.unwrap();
        assert_eq!(found, Reply::found(queue.handle()));
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_larger_than_core_mailbox_is_fully_served() {
    let server = TestServer::start_with(|config| {
        config.mailbox.max_messages = 2;
    })
    .await;

    let mut tasks = Vec::new();
    for i in 0..48 {
        let client = server.client();
        tasks.push(tokio::spawn(async move {
            client.find(&format!("missing-{i}")).await
        }));
    }
    for task in tasks {
        let reply = task.await.unwrap().unwrap();
        assert_eq!(reply.status, Status::PortNotSubscribed);
    }
    assert_eq!(server.requests_handled(), 48);

    server.stop().await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_kernel_probe_tracks_queue_lifetime() {
    let id = unsafe { libc::msgget(libc::IPC_PRIVATE, libc::IPC_CREAT | 0o600) };
    if id < 0 {
        eprintln!("System V message queues unavailable, skipping");
        return;
    }
    let handle = QueueHandle::new(id as u32);

    let server = TestServer::start_with(|config| {
        config.registry.queue_probe = ProbeKind::Sysv;
    })
    .await;
    let client = server.client();

    assert_eq!(client.add("kernel", handle).await.unwrap().status, Status::OkAdd);
    assert_eq!(client.find("kernel").await.unwrap(), Reply::found(handle));

    let rc = unsafe { libc::msgctl(id, libc::IPC_RMID, std::ptr::null_mut()) };
    assert_eq!(rc, 0);
    assert_eq!(
        client.add("kernel-again", handle).await.unwrap().status,
        Status::QueueNotExists
    );

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_unlinks_socket() {
    let server = TestServer::start().await;
    let socket = server.socket_path();
    assert!(socket.exists());

    let encoded = encode_command(&Command::Find { name: "x".into() });
    assert!(!exchange_raw(&server.addr, &encoded).await.is_empty());

    let dir = server.stop().await;
    assert!(dir.path().exists());
    assert!(!socket.exists());
}
