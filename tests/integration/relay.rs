//! Job relay: multi-hop routes, retries, direct addressing, acks.

use crate::*;
use brigade_core::topic::{CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEXT, TOPIC_WORKER_NEXT_ACK};
use brigade_core::{WireCodec, WorkerDescriptor};
use brigade_worker::Worker;

/// A job travels a two-hop route, keeping its id, and every sender's
/// in-flight table drains once the acks come back.
#[tokio::test]
async fn job_travels_a_two_hop_route() {
    let bus = new_bus();
    let config = test_config();

    let first_hop = Recorder::relaying();
    let second_hop = Recorder::sink();
    let wa = Worker::spawn(bus.clone(), &config, "WA", first_hop.clone())
        .await
        .unwrap();
    let wb = Worker::spawn(bus.clone(), &config, "WB", second_hop.clone())
        .await
        .unwrap();
    let sender = Worker::spawn(bus.clone(), &config, "SRC", Recorder::sink())
        .await
        .unwrap();

    sender.send_to_next_worker(
        vec!["WA:*".to_string(), "WB:*".to_string()],
        serde_json::json!({ "title": "toto" }),
    );

    wait_for("second hop acceptance", || second_hop.job_count() == 1).await;

    let at_first = first_hop.jobs().remove(0);
    let at_second = second_hop.jobs().remove(0);
    assert_eq!(at_first.id, at_second.id, "job id must survive relaying");
    assert_eq!(at_second.workers_list_id, 1);
    assert_eq!(at_second.data["title"], "toto");
    assert_eq!(at_second.sender.id, wa.id(), "second hop sent by the first");

    wait_for_in_flight(&sender, 0).await;
    wait_for_in_flight(&wa, 0).await;

    wa.shutdown().await;
    wb.shutdown().await;
    sender.shutdown().await;
}

/// A worker can send a job whose first hop is its own kind: it accepts
/// the offer off the bus loopback, settles its own in-flight entry, and
/// relays onward.
#[tokio::test]
async fn sender_takes_the_first_hop_itself() {
    let bus = new_bus();
    let config = test_config();

    let first_hop = Recorder::relaying();
    let second_hop = Recorder::sink();
    let wa = Worker::spawn(bus.clone(), &config, "WA", first_hop.clone())
        .await
        .unwrap();
    let wb = Worker::spawn(bus.clone(), &config, "WB", second_hop.clone())
        .await
        .unwrap();

    wa.send_to_next_worker(
        vec!["WA:*".to_string(), "WB:*".to_string()],
        serde_json::json!({ "title": "toto" }),
    );

    wait_for("second hop acceptance", || second_hop.job_count() == 1).await;
    assert_eq!(first_hop.job_count(), 1);
    assert_eq!(second_hop.jobs().remove(0).workers_list_id, 1);

    wait_for_in_flight(&wa, 0).await;

    wa.shutdown().await;
    wb.shutdown().await;
}

/// An unacknowledged job is resent exactly `max_tries` times in total,
/// then abandoned with a single failure callback.
#[tokio::test]
async fn unacked_job_retries_then_fails() {
    let bus = new_bus();
    let config = test_config();

    let recorder = Recorder::sink();
    let sender = Worker::spawn(bus.clone(), &config, "WA", recorder.clone())
        .await
        .unwrap();

    // Raw tap on the job topic to count the actual sends.
    let mut tap = bus
        .subscribe(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEXT)
        .await
        .unwrap();

    // Nobody serves WC, and there is no manager to say so.
    sender.send_to_next_worker(vec!["WC:*".to_string()], serde_json::json!({ "n": 1 }));

    wait_for("retry exhaustion", || recorder.failure_count() == 1).await;

    let notice = recorder.failures().remove(0);
    assert_eq!(notice.error, "too many attempts");
    assert_eq!(notice.data["n"], 1);

    let mut sends = 0;
    while tap.try_recv().is_some() {
        sends += 1;
    }
    assert_eq!(sends, config.relay.max_tries, "initial send plus resends");

    // No zombie timer: the failure is terminal.
    tokio::time::sleep(config.relay.retry_interval() * 2).await;
    assert_eq!(recorder.failure_count(), 1);
    wait_for_in_flight(&sender, 0).await;

    sender.shutdown().await;
}

/// A direct-addressed job reaches the named worker even when it does not
/// hold the rotation token, and the token does not move.
#[tokio::test]
async fn direct_address_bypasses_rotation() {
    let bus = new_bus();
    let config = test_config();

    let holder_recorder = Recorder::sink();
    let other_recorder = Recorder::sink();
    let w1 = Worker::spawn(bus.clone(), &config, "WA", holder_recorder.clone())
        .await
        .unwrap();
    let w2 = Worker::spawn(bus.clone(), &config, "WA", other_recorder.clone())
        .await
        .unwrap();
    let sender = Worker::spawn(bus.clone(), &config, "SRC", Recorder::sink())
        .await
        .unwrap();

    wait_for_peers(&w1, 2).await;
    wait_for_peers(&w2, 2).await;
    assert_eq!(token_holder(&[&w1, &w2]).await, 0);

    sender.send_to_next_worker(vec![w2.id().to_string()], serde_json::json!(null));
    wait_for("direct acceptance", || other_recorder.job_count() == 1).await;
    assert_eq!(holder_recorder.job_count(), 0);
    assert!(other_recorder.jobs().remove(0).direct);

    wait_for_in_flight(&sender, 0).await;
    // The token stays where it was.
    assert_eq!(token_holder(&[&w1, &w2]).await, 0);

    w1.shutdown().await;
    w2.shutdown().await;
    sender.shutdown().await;
}

/// Acks for unknown jobs from unrelated kinds disturb nothing.
#[tokio::test]
async fn foreign_acks_are_ignored() {
    let bus = new_bus();
    let config = test_config();

    let recorder = Recorder::sink();
    let worker = Worker::spawn(bus.clone(), &config, "WA", recorder.clone())
        .await
        .unwrap();

    let stranger = WorkerDescriptor::new("WB");
    let mut ack = brigade_core::JobEnvelope::new(
        vec!["WB:*".to_string()],
        serde_json::json!(null),
        stranger.clone(),
        0,
        Some("J0".to_string()),
    );
    ack.handled_by = Some(stranger);
    let payload = WireCodec::Json.encode(&ack).unwrap();
    bus.publish(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEXT_ACK, payload)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let snap = snapshot(&worker).await;
    assert!(snap.next_job_for_me, "foreign ack must not move the token");
    assert_eq!(snap.in_flight, 0);
    assert_eq!(recorder.job_count(), 0);
    assert_eq!(recorder.failure_count(), 0);

    worker.shutdown().await;
}
