//! Upload and retrieval over real sockets: ring placement, catalog
//! propagation and descriptor publication.

use covey_net::Message;
use covey_store::ChunkStore;
use covey_tests::{TcpCluster, next_locations, test_data};

#[tokio::test]
async fn test_upload_places_chunks_on_workers() {
    let cluster = TcpCluster::start(5).await.unwrap();
    let data = test_data(2000);

    let reply = cluster
        .request(
            4,
            Message::Upload {
                file_name: "data.bin".to_string(),
                data,
            },
        )
        .await
        .unwrap();
    assert_eq!(reply, Message::Ack);

    // Ring of three workers (driver and learner excluded), two parts
    // each; nothing lands on the driver or the learner.
    for worker in 1..=3 {
        assert_eq!(cluster.store(worker).list().await.unwrap().len(), 2);
    }
    assert!(cluster.store(0).list().await.unwrap().is_empty());
    assert!(cluster.store(4).list().await.unwrap().is_empty());

    // Every node ends up listing the file.
    for i in 0..cluster.len() {
        let report = cluster.status(i).await.unwrap();
        assert_eq!(report.files, vec!["data.bin".to_string()]);
    }
}

#[tokio::test]
async fn test_round_trip_through_descriptors() {
    let cluster = TcpCluster::start(3).await.unwrap();
    let data = test_data(768);
    cluster
        .request(
            2,
            Message::Upload {
                file_name: "pipeline.bin".to_string(),
                data: data.clone(),
            },
        )
        .await
        .unwrap();

    let mut events = cluster.node(2).view().subscribe();
    let reply = cluster
        .request(
            2,
            Message::Retrieve {
                file_name: "pipeline.bin".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(reply, Message::Ack);

    let (file, descriptors) = next_locations(&mut events).await;
    assert_eq!(file, "pipeline.bin");
    assert_eq!(descriptors.len(), 1);

    // Following the descriptor to the holder's store yields the file.
    let holder = cluster
        .index_of(&descriptors[0].holder)
        .expect("holder is a cluster member");
    assert_eq!(holder, 1);
    let bytes = cluster
        .store(holder)
        .get(&descriptors[0].chunk_name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bytes, data);
}

#[tokio::test]
async fn test_learner_refuses_uploads() {
    let cluster = TcpCluster::start(3).await.unwrap();

    let reply = cluster
        .request(
            0,
            Message::Upload {
                file_name: "nope.txt".to_string(),
                data: vec![1, 2, 3],
            },
        )
        .await
        .unwrap();
    assert!(matches!(reply, Message::Refused { .. }));
}
