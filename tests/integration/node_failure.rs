//! Failure handling over real sockets: leader takeover and operation
//! with dead peers.

use covey_net::Message;
use covey_tests::{TcpCluster, eventually, test_data};
use covey_types::NodeId;

#[tokio::test]
async fn test_leader_failure_triggers_takeover() {
    let cluster = TcpCluster::start(3).await.unwrap();
    cluster.kill(2);

    // A survivor's monitor notices the dead leader; node 1 outranks
    // node 0 and wins the election, and node 0 stays the learner.
    let view = cluster.node(1).view().clone();
    assert!(
        eventually(move || {
            let view = view.clone();
            async move {
                view.leader().await == NodeId::new(1)
                    && view.learner().await == Some(NodeId::new(0))
            }
        })
        .await
    );

    for i in [0usize, 1] {
        let report = cluster.status(i).await.unwrap();
        assert_eq!(report.leader, NodeId::new(1));
        assert_eq!(report.learner, Some(NodeId::new(0)));
        assert!(report.epoch >= 1);
    }
}

#[tokio::test]
async fn test_upload_survives_dead_learner() {
    let cluster = TcpCluster::start(3).await.unwrap();
    cluster.kill(0);

    let reply = cluster
        .request(
            2,
            Message::Upload {
                file_name: "orphan.txt".to_string(),
                data: test_data(64),
            },
        )
        .await
        .unwrap();
    assert_eq!(reply, Message::Ack);

    // The chunk landed even though the records could not be aggregated.
    use covey_store::ChunkStore;
    assert_eq!(
        cluster.store(1).list().await.unwrap(),
        vec!["orphan.txt.part-0"]
    );
    let report = cluster.status(2).await.unwrap();
    assert_eq!(report.files, vec!["orphan.txt".to_string()]);
}

#[tokio::test]
async fn test_election_reassigns_lost_learner() {
    let cluster = TcpCluster::start(4).await.unwrap();
    cluster.kill(0); // learner
    cluster.kill(3); // leader

    // Node 2 outranks node 1 and takes over; with the old learner dead
    // the scan falls through to the next node that answers.
    let view = cluster.node(2).view().clone();
    assert!(
        eventually(move || {
            let view = view.clone();
            async move {
                view.leader().await == NodeId::new(2)
                    && view.learner().await == Some(NodeId::new(1))
            }
        })
        .await
    );

    for i in [1usize, 2] {
        let report = cluster.status(i).await.unwrap();
        assert_eq!(report.leader, NodeId::new(2));
        assert_eq!(report.learner, Some(NodeId::new(1)));
    }
}
