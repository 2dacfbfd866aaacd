// tests/integration/routing_test.rs

//! End-to-end routing over real TCP connections to loopback RESP nodes.

use super::test_helpers::*;
use spineldb_router::config::{Config, NodeConfig};
use spineldb_router::core::cluster::ClusterRouter;
use spineldb_router::core::protocol::RespFrame;
use spineldb_router::core::router::Router;
use spineldb_router::core::sharding::ShardedRouter;
use spineldb_router::core::{Command, RouterError};
use std::time::Duration;

fn node_config(node: &LoopbackNode, slots: Option<&str>) -> NodeConfig {
    NodeConfig {
        host: node.address.host.clone(),
        port: node.address.port,
        alias: None,
        weight: None,
        slots: slots.map(str::to_string),
    }
}

#[tokio::test]
async fn test_cluster_router_follows_moved_over_tcp() {
    init_tracing();
    let owner = LoopbackNode::start(|cmd| match cmd.id() {
        "GET" => bulk("from-owner"),
        _ => ok(),
    })
    .await;
    let owner_addr = owner.address.to_string();
    let stale = LoopbackNode::start(move |cmd| {
        let slot = spineldb_router::core::cluster::get_slot(&cmd.args()[0]);
        err(&format!("MOVED {slot} {owner_addr}"))
    })
    .await;

    let mut config = Config::default();
    config.cluster.refresh_on_moved = false;
    config.nodes = vec![node_config(&stale, Some("0-16383"))];
    let router = ClusterRouter::from_config(&config).unwrap();

    let reply = router
        .execute(&Command::new("GET", ["foo"]))
        .await
        .unwrap();
    assert_eq!(reply, bulk("from-owner"));
    assert_eq!(router.slot_map().get(12182), Some(&owner.address));
    assert_eq!(router.len(), 2);
    assert!(router.is_connected());
}

#[tokio::test]
async fn test_cluster_router_learns_topology_over_tcp() {
    init_tracing();
    let second = LoopbackNode::start(|cmd| match cmd.id() {
        "SET" => ok(),
        _ => err("ERR unexpected"),
    })
    .await;
    let second_addr = second.address.to_string();
    let first = LoopbackNode::start(move |cmd| match cmd.id() {
        "CLUSTER" => cluster_slots_reply(&[(0, 16383, second_addr.as_str())]),
        _ => err("ERR not mine"),
    })
    .await;

    let mut config = Config::default();
    config.nodes = vec![node_config(&first, None)];
    let router = ClusterRouter::from_config(&config).unwrap();
    router.refresh_topology().await.unwrap();

    let reply = router
        .execute(&Command::new("SET", ["k", "v"]))
        .await
        .unwrap();
    assert_eq!(reply, ok());
    assert!(router.slot_map().is_complete());
}

#[tokio::test]
async fn test_unreachable_node_surfaces_connection_failure() {
    // Grab a free port, then close it so nothing listens there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = Config::default();
    config.cluster.retry_limit = 1;
    config.cluster.retry_interval = Duration::from_millis(1);
    config.nodes = vec![NodeConfig {
        host: "127.0.0.1".into(),
        port,
        alias: None,
        weight: None,
        slots: Some("0-16383".into()),
    }];
    let router = ClusterRouter::from_config(&config).unwrap();
    let err = router
        .execute(&Command::new("GET", ["k"]))
        .await
        .unwrap_err();
    assert!(err.is_connection_failure(), "{err:?}");
}

#[tokio::test]
async fn test_sharded_router_over_tcp() {
    init_tracing();
    let mut nodes = Vec::new();
    for i in 0..3 {
        nodes.push(
            LoopbackNode::start(move |cmd| match cmd.id() {
                "PING" => RespFrame::SimpleString("PONG".into()),
                _ => RespFrame::Integer(i),
            })
            .await,
        );
    }
    let mut config = Config::default();
    config.nodes = nodes.iter().map(|n| node_config(n, None)).collect();
    let router = ShardedRouter::from_config(&config).unwrap();
    router.connect().await.unwrap();

    for i in 0..20 {
        let key = format!("session:{i}");
        let owner = router.node_for_key(key.as_bytes()).unwrap();
        let index = nodes
            .iter()
            .position(|n| &n.address == owner.address())
            .unwrap() as i64;
        let reply = router
            .execute(&Command::new("INCR", [key]))
            .await
            .unwrap();
        assert_eq!(reply, RespFrame::Integer(index));
    }

    let pings = router
        .execute_on_each_node(&Command::new("PING", Vec::<String>::new()))
        .await;
    assert_eq!(pings.len(), 3);
    for (_, reply) in pings {
        assert_eq!(reply, Ok(RespFrame::SimpleString("PONG".into())));
    }

    let err = router
        .execute(&Command::new("KEYS", ["*"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Unroutable { .. }));
}
