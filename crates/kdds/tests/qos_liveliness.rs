// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Liveliness end-to-end: the three kinds, assertion scopes, lease expiry
//! observed at matched readers, and degenerate (write-triggered) leases.

mod common;

use std::time::Duration;

use common::{unique_topic, Space};
use kdds::dds::Liveliness;
use kdds::{Participant, QosProfile};

const LEASE: Duration = Duration::from_millis(300);
/// Comfortably past the lease plus the housekeeping cadence.
const EXPIRY_WAIT: Duration = Duration::from_millis(1000);
const SETTLE: Duration = Duration::from_millis(50);

fn qos_with(liveliness: Liveliness) -> QosProfile {
    QosProfile::reliable().liveliness(liveliness)
}

#[test]
fn test_three_kinds_expiry_and_assertion() {
    let participant = Participant::new();
    let topic = unique_topic("liveliness_kinds");

    // A permissive reader matches all three writers.
    let reader = participant
        .create_reader::<Space>(
            &topic,
            qos_with(Liveliness::automatic(Duration::from_secs(3600))),
        )
        .expect("create reader");

    // The automatic lease is a bit longer so the PMD cadence (0.8 x
    // lease) has comfortable margin over scheduler jitter.
    let w_auto = participant
        .create_writer::<Space>(
            &topic,
            qos_with(Liveliness::automatic(Duration::from_millis(500))),
        )
        .expect("automatic writer");
    let w_mbp = participant
        .create_writer::<Space>(&topic, qos_with(Liveliness::manual_by_participant(LEASE)))
        .expect("mbp writer");
    let w_mbt = participant
        .create_writer::<Space>(&topic, qos_with(Liveliness::manual_by_topic(LEASE)))
        .expect("mbt writer");

    w_auto.write(&Space::new(1, 0, 0)).expect("write");
    w_mbp.write(&Space::new(2, 0, 0)).expect("write");
    w_mbt.write(&Space::new(3, 0, 0)).expect("write");

    std::thread::sleep(SETTLE);
    let s = reader.get_liveliness_changed_status();
    assert_eq!(s.alive_count, 3, "all writers alive after matching");

    // Pause writes, assert nothing: AUTOMATIC stays alive via PMD, the
    // manual kinds expire within one lease.
    std::thread::sleep(EXPIRY_WAIT);
    let s = reader.get_liveliness_changed_status();
    assert_eq!(s.alive_count, 1, "only the automatic writer survives");
    assert_eq!(s.not_alive_count, 2);

    // Participant-level assertion regains MBP but not MBT.
    participant.assert_liveliness();
    std::thread::sleep(SETTLE);
    let s = reader.get_liveliness_changed_status();
    assert_eq!(s.alive_count, 2, "mbp regained");
    assert_eq!(s.not_alive_count, 1);

    // Writer-level assertion regains MBT.
    w_mbt.assert_liveliness().expect("assert mbt");
    std::thread::sleep(SETTLE);
    let s = reader.get_liveliness_changed_status();
    assert_eq!(s.alive_count, 3, "mbt regained");
    assert_eq!(s.not_alive_count, 0);
}

#[test]
fn test_write_renews_manual_by_participant_fleet() {
    let participant = Participant::new();
    let topic = unique_topic("liveliness_write_renew");

    let reader = participant
        .create_reader::<Space>(
            &topic,
            qos_with(Liveliness::automatic(Duration::from_secs(3600))),
        )
        .expect("create reader");

    let w_mbp = participant
        .create_writer::<Space>(&topic, qos_with(Liveliness::manual_by_participant(LEASE)))
        .expect("mbp writer");
    let w_other = participant
        .create_writer::<Space>(
            &topic,
            qos_with(Liveliness::automatic(Duration::from_secs(3600))),
        )
        .expect("other writer");

    w_mbp.write(&Space::new(1, 0, 0)).expect("write");
    std::thread::sleep(SETTLE);

    // Keep writing on the *other* writer across several lease windows: a
    // write by any writer under the participant renews MBP writers.
    for _ in 0..8 {
        w_other.write(&Space::new(2, 0, 0)).expect("write");
        std::thread::sleep(LEASE / 2);
    }

    let s = reader.get_liveliness_changed_status();
    assert_eq!(s.alive_count, 2, "mbp kept alive by sibling writes");
}

#[test]
fn test_match_survives_liveliness_transition() {
    let participant = Participant::new();
    let topic = unique_topic("liveliness_match_survives");

    let reader = participant
        .create_reader::<Space>(
            &topic,
            qos_with(Liveliness::automatic(Duration::from_secs(3600))),
        )
        .expect("create reader");
    let writer = participant
        .create_writer::<Space>(&topic, qos_with(Liveliness::manual_by_topic(LEASE)))
        .expect("create writer");

    writer.write(&Space::new(1, 0, 0)).expect("write");
    std::thread::sleep(EXPIRY_WAIT);

    let s = reader.get_liveliness_changed_status();
    assert_eq!(s.alive_count, 0);
    assert_eq!(s.not_alive_count, 1);

    // Subscription-matched stays current across the transition.
    let sm = reader.get_subscription_matched_status();
    assert_eq!(sm.current_count, 1);

    // And data still flows after a renewal.
    writer.write(&Space::new(1, 1, 0)).expect("write");
    std::thread::sleep(SETTLE);
    let s = reader.get_liveliness_changed_status();
    assert_eq!(s.alive_count, 1);
}

#[test]
fn test_writer_liveliness_lost_status() {
    let participant = Participant::new();
    let topic = unique_topic("liveliness_lost");

    let writer = participant
        .create_writer::<Space>(&topic, qos_with(Liveliness::manual_by_topic(LEASE)))
        .expect("create writer");
    let _reader = participant
        .create_reader::<Space>(
            &topic,
            qos_with(Liveliness::automatic(Duration::from_secs(3600))),
        )
        .expect("create reader");

    writer.write(&Space::new(1, 0, 0)).expect("write");
    std::thread::sleep(EXPIRY_WAIT);

    let lost = writer.get_liveliness_lost_status();
    assert!(lost.total_count >= 1, "manual writer missed its own lease");
}

#[test]
fn test_degenerate_lease_toggles_per_batch() {
    // A zero-length lease means the writer is alive only for the instant
    // of a write: observable as at least one alive -> not-alive toggle
    // per batch of writes, not one per sample.
    let participant = Participant::new();
    let topic = unique_topic("liveliness_zero_lease");

    let reader = participant
        .create_reader::<Space>(
            &topic,
            qos_with(Liveliness::automatic(Duration::from_secs(3600))),
        )
        .expect("create reader");
    let writer = participant
        .create_writer::<Space>(
            &topic,
            qos_with(Liveliness::manual_by_topic(Duration::from_nanos(1))),
        )
        .expect("create writer");

    for i in 0..20 {
        writer.write(&Space::new(1, i, 0)).expect("write");
    }
    std::thread::sleep(Duration::from_millis(100));

    let s = reader.get_liveliness_changed_status();
    assert_eq!(s.alive_count, 0, "instantly expired after the batch");
    assert!(
        s.not_alive_count_change >= 1,
        "at least one observable toggle per batch"
    );
}
