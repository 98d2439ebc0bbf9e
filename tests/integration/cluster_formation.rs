//! Cluster formation: seeded roles and status reporting over real
//! sockets.

use covey_net::Message;
use covey_tests::TcpCluster;
use covey_types::{NodeId, Role};

#[tokio::test]
async fn test_seeded_roles() {
    let cluster = TcpCluster::start(3).await.unwrap();

    for (i, role) in [(0usize, Role::Learner), (1, Role::Worker), (2, Role::Leader)] {
        let report = cluster.status(i).await.unwrap();
        assert_eq!(report.node_id, NodeId::new(i as u16));
        assert_eq!(report.role, role);
        assert_eq!(report.leader, NodeId::new(2));
        assert_eq!(report.learner, Some(NodeId::new(0)));
        assert_eq!(report.epoch, 0);
        assert!(report.live);
        assert!(report.files.is_empty());
    }
}

#[tokio::test]
async fn test_two_node_cluster_splits_roles() {
    let cluster = TcpCluster::start(2).await.unwrap();

    let low = cluster.status(0).await.unwrap();
    let high = cluster.status(1).await.unwrap();
    assert_eq!(low.role, Role::Learner);
    assert_eq!(high.role, Role::Leader);
    assert_eq!(low.leader, NodeId::new(1));
    assert_eq!(low.learner, Some(NodeId::new(0)));
    assert_eq!(high.learner, Some(NodeId::new(0)));
}

#[tokio::test]
async fn test_down_flag_round_trips() {
    let cluster = TcpCluster::start(3).await.unwrap();

    let reply = cluster
        .request(1, Message::SetLive { up: false })
        .await
        .unwrap();
    assert_eq!(reply, Message::Ack);
    assert!(!cluster.status(1).await.unwrap().live);

    cluster
        .request(1, Message::SetLive { up: true })
        .await
        .unwrap();
    assert!(cluster.status(1).await.unwrap().live);
}
