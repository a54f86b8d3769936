//! Coordinator request surface over real TCP

mod common;

use chrono::Utc;
use minifs::common::protocol::{connect, read_frame, write_frame};
use minifs::common::{Error, ErrorKind, FileMetadata, Response, Status};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

fn metadata(file_id: &str, file_size: u64) -> FileMetadata {
    FileMetadata {
        file_id: file_id.to_string(),
        file_name: format!("{}.bin", file_id),
        file_size,
        upload_time: Utc::now(),
    }
}

#[tokio::test]
async fn test_register_and_list_nodes() {
    let coord = common::start_coordinator().await;
    let client = coord.client();

    let record = client
        .register_node(Some("n1".into()), "10.0.0.1", 10000, 1000, 100)
        .await
        .unwrap();
    assert_eq!(record.node_id, "n1");
    assert!(record.status.is_online());
    assert_eq!(record.free_bytes(), 900);

    // a missing id is assigned by the coordinator
    let assigned = client
        .register_node(None, "10.0.0.2", 10001, 1000, 0)
        .await
        .unwrap();
    assert!(!assigned.node_id.is_empty());

    let nodes = client.available_nodes().await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().any(|n| n.node_id == "n1"));
    assert!(nodes.iter().any(|n| n.node_id == assigned.node_id));
}

#[tokio::test]
async fn test_reregister_overwrites_record() {
    let coord = common::start_coordinator().await;
    let client = coord.client();

    client
        .register_node(Some("n1".into()), "10.0.0.1", 10000, 1000, 0)
        .await
        .unwrap();
    client
        .register_node(Some("n1".into()), "10.0.0.9", 12000, 2000, 50)
        .await
        .unwrap();

    let nodes = client.available_nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].ip, "10.0.0.9");
    assert_eq!(nodes[0].port, 12000);
    assert_eq!(nodes[0].capacity_bytes, 2000);
}

#[tokio::test]
async fn test_heartbeat_updates_usage() {
    let coord = common::start_coordinator().await;
    let client = coord.client();

    client
        .register_node(Some("n1".into()), "10.0.0.1", 10000, 1000, 0)
        .await
        .unwrap();
    client.heartbeat("n1", 400).await.unwrap();

    let state = coord.state.lock().unwrap();
    assert_eq!(state.get_node("n1").unwrap().used_bytes, 400);
}

#[tokio::test]
async fn test_heartbeat_from_unknown_node() {
    let coord = common::start_coordinator().await;
    let client = coord.client();

    let err = client.heartbeat("ghost", 10).await.unwrap_err();
    assert!(matches!(err, Error::Registration(_)));
    assert!(coord.state.lock().unwrap().all_nodes().is_empty());
}

#[tokio::test]
async fn test_upload_request_picks_most_free_space() {
    let coord = common::start_coordinator().await;
    let client = coord.client();

    // A: 10 capacity, 2 free. B: 10 capacity, 8 free.
    client
        .register_node(Some("a".into()), "10.0.0.1", 1, 10, 8)
        .await
        .unwrap();
    client
        .register_node(Some("b".into()), "10.0.0.2", 2, 10, 2)
        .await
        .unwrap();

    assert_eq!(client.upload_request(5).await.unwrap().node_id, "b");
    assert_eq!(client.upload_request(1).await.unwrap().node_id, "b");
    assert_eq!(client.upload_request(8).await.unwrap().node_id, "b");

    let err = client.upload_request(9).await.unwrap_err();
    assert!(matches!(err, Error::Capacity(_)));
}

#[tokio::test]
async fn test_upload_request_with_no_nodes() {
    let coord = common::start_coordinator().await;
    let err = coord.client().upload_request(1).await.unwrap_err();
    assert!(matches!(err, Error::Capacity(_)));
}

#[tokio::test]
async fn test_file_registry_flow() {
    let coord = common::start_coordinator().await;
    let client = coord.client();

    client
        .register_node(Some("n1".into()), "10.0.0.1", 10000, 1000, 0)
        .await
        .unwrap();
    client
        .register_file("f1", vec!["n1".into()], "alice", metadata("f1", 10))
        .await
        .unwrap();

    let locations = client.file_locations("f1").await.unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].node_id, "n1");
    assert_eq!(client.download_request("f1").await.unwrap().len(), 1);

    let files = client.user_files("alice").await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_id, "f1");
    assert!(client.user_files("bob").await.unwrap().is_empty());

    client.delete_file("f1", "alice").await.unwrap();
    assert!(client.user_files("alice").await.unwrap().is_empty());
    let err = client.file_locations("f1").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_duplicate_register_file_appends() {
    let coord = common::start_coordinator().await;
    let client = coord.client();

    client
        .register_node(Some("n1".into()), "10.0.0.1", 10000, 1000, 0)
        .await
        .unwrap();
    for _ in 0..2 {
        client
            .register_file("f1", vec!["n1".into()], "alice", metadata("f1", 10))
            .await
            .unwrap();
    }

    assert_eq!(client.user_files("alice").await.unwrap().len(), 2);
    let state = coord.state.lock().unwrap();
    assert_eq!(state.file_replicas("f1").unwrap(), ["n1", "n1"]);
}

#[tokio::test]
async fn test_delete_file_of_other_user_keeps_owner_list() {
    let coord = common::start_coordinator().await;
    let client = coord.client();

    client
        .register_file("f1", vec!["n1".into()], "alice", metadata("f1", 10))
        .await
        .unwrap();
    client.delete_file("f1", "bob").await.unwrap();

    // the location entry is gone, alice's listing is untouched
    assert_eq!(client.user_files("alice").await.unwrap().len(), 1);
    assert!(client.file_locations("f1").await.is_err());
}

#[tokio::test]
async fn test_unknown_request_type_gets_protocol_error() {
    let coord = common::start_coordinator().await;
    let timeout = Some(Duration::from_secs(5));

    let mut stream = connect(&coord.addr, timeout).await.unwrap();
    let bogus = serde_json::json!({ "type": "format_disk" });
    write_frame(&mut stream, &bogus, timeout).await.unwrap();
    let resp: Response = read_frame(&mut stream, timeout).await.unwrap();

    assert_eq!(resp.status, Status::Error);
    assert_eq!(resp.error, Some(ErrorKind::ProtocolError));
}

#[tokio::test]
async fn test_oversized_frame_gets_protocol_error() {
    let coord = common::start_coordinator().await;
    let timeout = Some(Duration::from_secs(5));

    let mut stream = connect(&coord.addr, timeout).await.unwrap();
    stream.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
    let resp: Response = read_frame(&mut stream, timeout).await.unwrap();

    assert_eq!(resp.status, Status::Error);
    assert_eq!(resp.error, Some(ErrorKind::ProtocolError));
}

#[tokio::test]
async fn test_concurrent_requests() {
    let coord = common::start_coordinator().await;

    let mut tasks = Vec::new();
    for i in 0..32u16 {
        let client = coord.client();
        tasks.push(tokio::spawn(async move {
            client
                .register_node(Some(format!("n{}", i)), "10.0.0.1", 10000 + i, 1000, 0)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(coord.client().available_nodes().await.unwrap().len(), 32);
}
