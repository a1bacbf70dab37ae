//! System manager: directory tracking, feasibility notices, keepalive.

use crate::*;
use brigade_core::topic::{CHANNEL_POLLING, TOPIC_POLL_WORKER_LIST};
use brigade_manager::SystemManager;
use brigade_worker::Worker;

/// The directory follows announcements and departures.
#[tokio::test]
async fn directory_tracks_announcements_and_departures() {
    let bus = new_bus();
    let config = test_config();

    let manager = SystemManager::spawn(bus.clone(), &config).await.unwrap();
    let wa = Worker::spawn(bus.clone(), &config, "WA", Recorder::sink())
        .await
        .unwrap();
    let wb = Worker::spawn(bus.clone(), &config, "WB", Recorder::sink())
        .await
        .unwrap();

    wait_for("both workers in the directory", || {
        manager.directory().len() == 2
    })
    .await;

    let wa_id = wa.id().to_string();
    wa.shutdown().await;
    wait_for("departure removal", || manager.directory().len() == 1).await;
    let remaining = manager.directory().snapshot();
    assert_eq!(remaining[0].id, wb.id());
    assert!(!remaining.iter().any(|w| w.id == wa_id));

    wb.shutdown().await;
    manager.shutdown();
}

/// A job routed at a kind nobody serves earns the sender exactly one
/// failure notice instead of retrying into silence.
#[tokio::test]
async fn infeasible_route_notifies_the_sender() {
    let bus = new_bus();
    let config = test_config();

    let manager = SystemManager::spawn(bus.clone(), &config).await.unwrap();
    let recorder = Recorder::sink();
    let sender = Worker::spawn(bus.clone(), &config, "WA", recorder.clone())
        .await
        .unwrap();

    wait_for("sender in the directory", || manager.directory().len() == 1).await;

    sender.send_to_next_worker(vec!["WC:*".to_string()], serde_json::json!({ "n": 2 }));

    wait_for("infeasibility notice", || recorder.failure_count() == 1).await;
    let notice = recorder.failures().remove(0);
    assert_eq!(notice.error, "no worker available for this job");
    assert_eq!(notice.target, sender.id());
    assert_eq!(notice.data["n"], 2);

    // The notice settled the job: no retries, no second failure.
    tokio::time::sleep(config.relay.retry_interval() * 2).await;
    assert_eq!(recorder.failure_count(), 1);
    wait_for_in_flight(&sender, 0).await;

    sender.shutdown().await;
    manager.shutdown();
}

/// The polling-channel trigger dumps the directory without disturbing
/// it, and the manager keeps consuming events afterwards.
#[tokio::test]
async fn polling_trigger_leaves_the_directory_intact() {
    let bus = new_bus();
    let config = test_config();

    let manager = SystemManager::spawn(bus.clone(), &config).await.unwrap();
    let wa = Worker::spawn(bus.clone(), &config, "WA", Recorder::sink())
        .await
        .unwrap();
    wait_for("worker in the directory", || manager.directory().len() == 1).await;

    bus.publish(
        CHANNEL_POLLING,
        TOPIC_POLL_WORKER_LIST,
        bytes::Bytes::from_static(b"\"dump\""),
    )
    .await
    .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(manager.directory().len(), 1);
    assert_eq!(manager.directory().snapshot()[0].id, wa.id());

    // The event loop survived the dump: a later announcement lands.
    let wb = Worker::spawn(bus.clone(), &config, "WB", Recorder::sink())
        .await
        .unwrap();
    wait_for("post-dump announcement", || manager.directory().len() == 2).await;

    wa.shutdown().await;
    wb.shutdown().await;
    manager.shutdown();
}

/// A manager that starts after the workers fills its directory from the
/// re-announcements its startup keepalive provokes.
#[tokio::test]
async fn late_manager_learns_existing_workers() {
    let bus = new_bus();
    let config = test_config();

    let worker = Worker::spawn(bus.clone(), &config, "WA", Recorder::sink())
        .await
        .unwrap();
    let manager = SystemManager::spawn(bus.clone(), &config).await.unwrap();

    wait_for("directory healed", || manager.directory().len() == 1).await;
    assert_eq!(manager.directory().snapshot()[0].id, worker.id());

    worker.shutdown().await;
    manager.shutdown();
}

/// The periodic keepalive re-fills the directory after losses, and the
/// re-announcements it provokes never duplicate peer lists.
#[tokio::test]
async fn keepalive_heals_the_directory() {
    let bus = new_bus();
    let mut config = test_config();
    config.manager.keepalive_ms = 50;

    let manager = SystemManager::spawn(bus.clone(), &config).await.unwrap();
    let w1 = Worker::spawn(bus.clone(), &config, "WA", Recorder::sink())
        .await
        .unwrap();
    let w2 = Worker::spawn(bus.clone(), &config, "WA", Recorder::sink())
        .await
        .unwrap();

    wait_for("directory filled", || manager.directory().len() == 2).await;

    // Simulate directory loss; the next keepalive round restores it.
    manager.directory().remove(w1.id());
    assert_eq!(manager.directory().len(), 1);
    wait_for("directory healed", || manager.directory().len() == 2).await;

    // Several keepalive rounds have passed; dedupe held everywhere.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let snap = snapshot(&w1).await;
    assert_eq!(snap.peers.len(), 2);
    assert_eq!(token_holder(&[&w1, &w2]).await, 0);
    assert_eq!(manager.directory().len(), 2);

    w1.shutdown().await;
    w2.shutdown().await;
    manager.shutdown();
}
