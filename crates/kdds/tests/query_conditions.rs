// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Read/query condition behavior over a reader holding a fixed state
//! table. By writing, disposing, unregistering, reading and re-writing,
//! the reader history ends up as:
//!
//! | long_1 | long_2 | long_3 |    sst   | vst |    ist     |
//! |--------|--------|--------|----------|-----|------------|
//! |    0   |    0   |    0   |     read | old | alive      |
//! |    1   |    0   |    0   |     read | old | disposed   |
//! |    2   |    1   |    0   |     read | old | no_writers |
//! |    3   |    1   |    1   | not_read | old | alive      |
//! |    4   |    2   |    1   | not_read | new | disposed   |
//! |    5   |    2   |    1   | not_read | new | no_writers |
//! |    6   |    3   |    2   | not_read | new | alive      |

mod common;

use common::{unique_topic, Space};
use kdds::dds::{
    Condition, InstanceStateMask, ReadMask, SampleStateMask, ViewStateMask,
};
use kdds::rhc::{InstanceState, SampleState, ViewState};
use kdds::{DataReader, DataWriter, Participant, QosProfile};

const MAX_SAMPLES: usize = 7;
const LAST_READ_SST: i32 = 2;
const LAST_OLD_VST: i32 = 3;

fn sample_ist(idx: i32) -> InstanceState {
    match idx % 3 {
        0 => InstanceState::Alive,
        1 => InstanceState::NotAliveDisposed,
        _ => InstanceState::NotAliveNoWriters,
    }
}

fn sample_vst(idx: i32) -> ViewState {
    if idx <= LAST_OLD_VST {
        ViewState::NotNew
    } else {
        ViewState::New
    }
}

fn sample_sst(idx: i32) -> SampleState {
    if idx <= LAST_READ_SST {
        SampleState::Read
    } else {
        SampleState::NotRead
    }
}

fn space(idx: i32) -> Space {
    Space::new(idx, idx / 2, idx / 3)
}

fn build_state_table() -> (Participant, DataWriter<Space>, DataReader<Space>) {
    let participant = Participant::new();
    let topic = unique_topic("querycondition");

    let reader_qos = QosProfile::reliable().history_keep_last(1);
    let reader = participant
        .create_reader::<Space>(&topic, reader_qos)
        .expect("create reader");

    // The writer must not auto-dispose unregistered instances, so that
    // unregister yields NOT_ALIVE_NO_WRITERS.
    let writer_qos = QosProfile::reliable().autodispose_unregistered(false);
    let writer = participant
        .create_writer::<Space>(&topic, writer_qos)
        .expect("create writer");

    // Write all samples, driving each instance to its target state.
    for i in 0..MAX_SAMPLES as i32 {
        writer.write(&space(i)).expect("write");
        match sample_ist(i) {
            InstanceState::NotAliveDisposed => writer.dispose(&space(i)).expect("dispose"),
            InstanceState::NotAliveNoWriters => {
                writer.unregister_instance(&space(i)).expect("unregister");
            }
            InstanceState::Alive => {}
        }
    }

    // Read the first four instances to give them read & old-view states.
    let got = reader
        .read((LAST_OLD_VST + 1) as usize)
        .expect("state-table read");
    assert_eq!(got.len(), (LAST_OLD_VST + 1) as usize);

    // Re-write the samples that should be not_read & old-view.
    for i in (LAST_READ_SST + 1)..=LAST_OLD_VST {
        writer.write(&space(i)).expect("rewrite");
        match sample_ist(i) {
            InstanceState::NotAliveDisposed if i != 4 => {
                writer.dispose(&space(i)).expect("dispose");
            }
            InstanceState::NotAliveNoWriters => {
                writer.unregister_instance(&space(i)).expect("unregister");
            }
            _ => {}
        }
    }

    (participant, writer, reader)
}

#[test]
fn test_state_table_is_exact() {
    let (_participant, _writer, reader) = build_state_table();

    let got = reader.peek(MAX_SAMPLES).expect("peek");
    assert_eq!(got.len(), MAX_SAMPLES);
    for sample in &got {
        let value = sample.value.expect("decodes");
        let i = value.long_1;
        assert_eq!(value.long_2, i / 2, "long_2 of {}", i);
        assert_eq!(sample.info.sample_state, sample_sst(i), "sst of {}", i);
        assert_eq!(sample.info.view_state, sample_vst(i), "vst of {}", i);
        assert_eq!(sample.info.instance_state, sample_ist(i), "ist of {}", i);
    }
}

#[test]
fn test_query_condition_not_read_new_alive_mod2() {
    let (_participant, _writer, reader) = build_state_table();

    let mask = ReadMask::new(
        SampleStateMask::NOT_READ,
        ViewStateMask::NEW,
        InstanceStateMask::ALIVE,
    );
    let condition = reader.create_query_condition(mask, |s: &Space| s.long_1 % 2 == 0);

    let got = reader
        .read_with_condition(&condition.read_condition(), MAX_SAMPLES)
        .expect("read with condition");
    let keys: Vec<i32> = got
        .iter()
        .map(|s| s.value.expect("decodes").long_1)
        .collect();
    assert_eq!(keys, vec![6]);
}

#[test]
fn test_read_condition_masks_select_rows() {
    let (_participant, _writer, reader) = build_state_table();

    // All not-read rows.
    let mask = ReadMask::new(
        SampleStateMask::NOT_READ,
        ViewStateMask::ANY,
        InstanceStateMask::ANY,
    );
    let got = reader.peek_mask(MAX_SAMPLES, mask).expect("peek");
    let mut keys: Vec<i32> = got
        .iter()
        .map(|s| s.value.expect("decodes").long_1)
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, vec![3, 4, 5, 6]);

    // Instance part is a real bitset: both not-alive kinds together.
    let mask = ReadMask::new(
        SampleStateMask::ANY,
        ViewStateMask::ANY,
        InstanceStateMask::NOT_ALIVE_DISPOSED | InstanceStateMask::NOT_ALIVE_NO_WRITERS,
    );
    let got = reader.peek_mask(MAX_SAMPLES, mask).expect("peek");
    let mut keys: Vec<i32> = got
        .iter()
        .map(|s| s.value.expect("decodes").long_1)
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, vec![1, 2, 4, 5]);
}

#[test]
fn test_query_condition_filter_sees_invalid_samples() {
    let participant = Participant::new();
    let topic = unique_topic("query_invalid");
    let writer = participant
        .create_writer::<Space>(&topic, QosProfile::reliable())
        .expect("create writer");
    let reader = participant
        .create_reader::<Space>(&topic, QosProfile::reliable())
        .expect("create reader");

    // Dispose a never-written instance: only an invalid sample exists.
    // The predicate runs on the key-only value (non-key fields default).
    writer.dispose(&Space::new(4, 999, 999)).expect("dispose");

    let condition = reader.create_query_condition(ReadMask::any(), |s: &Space| {
        s.long_1 == 4 && s.long_2 == 0
    });
    let got = reader
        .read_with_condition(&condition.read_condition(), 16)
        .expect("read");
    assert_eq!(got.len(), 1);
    assert!(!got[0].info.valid_data);
}

#[test]
fn test_condition_triggers_and_wakes_waitset() {
    use kdds::WaitSet;
    use std::sync::Arc;
    use std::time::Duration;

    let participant = Participant::new();
    let topic = unique_topic("condition_wake");
    let writer = participant
        .create_writer::<Space>(&topic, QosProfile::reliable())
        .expect("create writer");
    let reader = participant
        .create_reader::<Space>(&topic, QosProfile::reliable())
        .expect("create reader");

    let condition = reader.create_read_condition(ReadMask::not_read());
    let waitset = WaitSet::new();
    waitset
        .attach_condition(condition.clone() as Arc<dyn Condition>)
        .expect("attach");

    assert!(!condition.get_trigger_value());
    writer.write(&Space::new(1, 2, 3)).expect("write");
    assert!(condition.get_trigger_value());

    let triggered = waitset
        .wait(Some(Duration::from_secs(2)))
        .expect("condition wakes waitset");
    assert_eq!(triggered[0].condition_id(), condition.condition_id());

    // Taking the matching samples clears the trigger.
    let _ = reader.take(16).expect("take");
    assert!(!condition.get_trigger_value());
}

#[test]
fn test_sample_rank_under_condition_mask() {
    let participant = Participant::new();
    let topic = unique_topic("rank_mask");
    let writer = participant
        .create_writer::<Space>(&topic, QosProfile::reliable())
        .expect("create writer");
    let reader = participant
        .create_reader::<Space>(&topic, QosProfile::reliable())
        .expect("create reader");

    for i in 0..3 {
        writer.write(&Space::new(1, i, 0)).expect("write");
    }

    // Ranks count later same-instance samples matching the same mask.
    let got = reader.peek(16).expect("peek");
    let ranks: Vec<u32> = got.iter().map(|s| s.info.sample_rank).collect();
    assert_eq!(ranks, vec![2, 1, 0]);
}
