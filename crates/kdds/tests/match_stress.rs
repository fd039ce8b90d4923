// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Concurrent matching stress: one writer against readers created from
//! many threads at once. Every reader must observe exactly one matched
//! transition 0 -> 1 -> 0, with no duplicate notifications.

mod common;

use std::sync::Arc;

use common::{unique_topic, Space};
use kdds::{Participant, QosProfile};

const READERS: usize = 100;

#[test]
fn test_hundred_concurrent_readers() {
    let participant = Arc::new(Participant::new());
    let topic = unique_topic("match_stress");

    let writer = participant
        .create_writer::<Space>(&topic, QosProfile::reliable())
        .expect("create writer");

    let mut threads = Vec::with_capacity(READERS);
    for _ in 0..READERS {
        let participant = Arc::clone(&participant);
        let topic = topic.clone();
        threads.push(std::thread::spawn(move || {
            participant
                .create_reader::<Space>(&topic, QosProfile::reliable())
                .expect("create reader")
        }));
    }
    let readers: Vec<_> = threads
        .into_iter()
        .map(|t| t.join().expect("reader thread"))
        .collect();

    // All creations complete: the writer saw every reader exactly once.
    let pm = writer.get_publication_matched_status();
    assert_eq!(pm.total_count, READERS as u32);
    assert_eq!(pm.current_count, READERS as u32);

    // Delete the writer; every reader observes 0 -> 1 -> 0 with no
    // duplicates.
    writer.close();

    for reader in &readers {
        let sm = reader.get_subscription_matched_status();
        assert_eq!(sm.total_count, 1, "one match ever");
        assert_eq!(sm.total_count_change, 1);
        assert_eq!(sm.current_count, 0, "unmatched after writer deletion");
        assert_eq!(sm.current_count_change, 0, "+1 then -1 since last read");
    }

    let pm = writer.get_publication_matched_status();
    assert_eq!(pm.current_count, 0);
    assert_eq!(pm.total_count, READERS as u32);
}

#[test]
fn test_concurrent_writers_single_reader() {
    let participant = Arc::new(Participant::new());
    let topic = unique_topic("match_stress_writers");

    let reader = participant
        .create_reader::<Space>(&topic, QosProfile::reliable())
        .expect("create reader");

    let mut threads = Vec::new();
    for i in 0..16 {
        let participant = Arc::clone(&participant);
        let topic = topic.clone();
        threads.push(std::thread::spawn(move || {
            let writer = participant
                .create_writer::<Space>(&topic, QosProfile::reliable())
                .expect("create writer");
            writer.write(&Space::new(i, i, 0)).expect("write");
            writer
        }));
    }
    let writers: Vec<_> = threads
        .into_iter()
        .map(|t| t.join().expect("writer thread"))
        .collect();

    let sm = reader.get_subscription_matched_status();
    assert_eq!(sm.total_count, writers.len() as u32);
    assert_eq!(sm.current_count, writers.len() as u32);

    // One sample per writer arrived.
    let got = reader.take(64).expect("take");
    assert_eq!(got.len(), writers.len());
}
