//! Integration tests for join gates built through a flow process.

use proptest::prelude::*;
use spillway_common::utils::error::{Error, GateError};
use spillway_common::{Fields, Tuple, tuple};
use spillway_core::codec::Serialization;
use spillway_core::spill::{SpillThreshold, source_from_pairs};
use spillway_engine::{Config, FlowProcess, JoinGate, MergeStream, SpillCounter};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn flow(config: Config) -> FlowProcess {
    FlowProcess::new(config, Serialization::builder()).unwrap()
}

fn key_fields(n: usize) -> Vec<Fields> {
    (0..n)
        .map(|_| Fields::named([("key", 0usize)]))
        .collect()
}

fn drain(gate: &mut dyn JoinGate, pos: usize) -> Vec<Tuple> {
    gate.iter(pos).unwrap().map(Result::unwrap).collect()
}

fn gates(flow: &FlowProcess, num_pipes: usize, num_self_joins: usize) -> Vec<Box<dyn JoinGate>> {
    vec![
        Box::new(flow.cogroup_gate(num_self_joins, key_fields(num_pipes))),
        Box::new(flow.memory_gate(num_self_joins, key_fields(num_pipes))),
    ]
}

// --- Partitioning ---

#[test]
fn two_branch_key_partitions_by_branch() {
    let flow = flow(Config::in_memory());
    let (t1, t2, t3) = (tuple!["K", 1i64], tuple!["K", 2i64], tuple!["K", 3i64]);

    for mut gate in gates(&flow, 2, 0) {
        let input = vec![(0, t1.clone()), (0, t2.clone()), (1, t3.clone())];
        gate.reset(tuple!["K"], source_from_pairs(input)).unwrap();

        assert!(!gate.is_empty(0).unwrap());
        assert!(!gate.is_empty(1).unwrap());
        assert_eq!(drain(gate.as_mut(), 0), vec![t1.clone(), t2.clone()]);
        assert_eq!(drain(gate.as_mut(), 1), vec![t3.clone()]);
    }
}

#[test]
fn self_join_slots_replay_identical_rows() {
    let flow = flow(Config::in_memory().with_spill_threshold(SpillThreshold::Tuples(4)));
    let rows: Vec<Tuple> = (0..10i64).map(|i| tuple!["k", i]).collect();

    for mut gate in gates(&flow, 1, 3) {
        assert_eq!(gate.size(), 4);
        let input = rows.iter().cloned().map(|t| (0, t)).collect::<Vec<_>>();
        gate.reset(tuple!["k"], source_from_pairs(input)).unwrap();

        for pos in 0..4 {
            assert_eq!(drain(gate.as_mut(), pos), rows);
        }
    }
}

#[test]
fn missing_branch_reports_empty() {
    let flow = flow(Config::in_memory());

    for mut gate in gates(&flow, 3, 0) {
        let input = vec![(1, tuple!["k", 1i64])];
        gate.reset(tuple!["k"], source_from_pairs(input)).unwrap();

        assert!(gate.is_empty(0).unwrap());
        assert!(!gate.is_empty(1).unwrap());
        assert!(gate.is_empty(2).unwrap());
    }
}

#[test]
fn positions_outside_gate_are_rejected() {
    let flow = flow(Config::in_memory());

    for mut gate in gates(&flow, 2, 0) {
        gate.reset(tuple!["k"], source_from_pairs(Vec::new())).unwrap();
        assert!(matches!(
            gate.iter(2),
            Err(Error::Gate(GateError::InvalidPosition { pos: 2, size: 2 }))
        ));
    }
}

#[test]
fn consecutive_keys_do_not_leak() {
    let flow = flow(Config::in_memory().with_spill_threshold(SpillThreshold::Tuples(3)));
    let mut gate = flow.cogroup_gate(0, key_fields(2));

    for key in 0..5i64 {
        let input: Vec<_> = (0..key)
            .map(|i| (0, tuple![key, i]))
            .chain((0..7).map(|i| (1, tuple![key, i])))
            .collect();
        gate.reset(tuple![key], source_from_pairs(input)).unwrap();

        assert_eq!(gate.is_empty(0).unwrap(), key == 0);
        assert_eq!(drain(&mut gate, 1).len(), 7);
        assert_eq!(drain(&mut gate, 0).len(), usize::try_from(key).unwrap());
    }
}

// --- Spilling ---

#[test]
fn large_branch_spills_and_reads_back_in_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default()
        .with_spill_dir(dir.path())
        .with_spill_threshold(SpillThreshold::Tuples(100))
        .with_spill_log_interval(2);
    let flow = flow(config);
    let mut gate = flow.cogroup_gate(0, key_fields(2));

    let rhs: Vec<Tuple> = (0..1_050i64).map(|i| tuple!["k", i, format!("v{i}")]).collect();
    let input: Vec<_> = std::iter::once((0, tuple!["k", -1i64, "lhs"]))
        .chain(rhs.iter().cloned().map(|t| (1, t)))
        .collect();
    gate.reset(tuple!["k"], source_from_pairs(input)).unwrap();

    assert_eq!(drain(&mut gate, 0), vec![tuple!["k", -1i64, "lhs"]]);
    assert_eq!(drain(&mut gate, 1), rhs);
    assert_eq!(drain(&mut gate, 1), rhs);
    assert_eq!(gate.spill_count(1).unwrap(), 10);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 10);

    let counters = flow.counters();
    assert_eq!(counters.counter(SpillCounter::SpillsWritten), 10);
    assert_eq!(counters.counter(SpillCounter::TuplesSpilled), 1_000);
    assert_eq!(counters.counter(SpillCounter::SpillsRead), 20);

    // the next key releases the previous key's segments
    gate.reset(tuple!["next"], source_from_pairs(Vec::new())).unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn dropping_gate_removes_spill_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default()
        .with_spill_dir(dir.path())
        .with_spill_threshold(SpillThreshold::Tuples(5));
    let flow = flow(config);

    let mut gate = flow.cogroup_gate(1, key_fields(1));
    let input: Vec<_> = (0..23i64).map(|i| (0, tuple!["k", i])).collect();
    gate.reset(tuple!["k"], source_from_pairs(input)).unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);

    drop(gate);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

// --- Merge ---

#[test]
fn merge_concatenates_gate_branches() {
    let flow = flow(Config::in_memory());
    let mut gate = flow.cogroup_gate(0, key_fields(3));
    let input = vec![
        (0, tuple!["k", 1i64]),
        (1, tuple!["k", 2i64]),
        (2, tuple!["k", 3i64]),
        (2, tuple!["k", 4i64]),
    ];
    gate.reset(tuple!["k"], source_from_pairs(input)).unwrap();

    let merged: Vec<_> = MergeStream::from_gate(&mut gate)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(merged.len(), 4);
    assert_eq!(merged[0], tuple!["k", 1i64]);
    assert_eq!(merged[3], tuple!["k", 4i64]);
}

proptest! {
    #[test]
    fn gate_output_matches_input_per_branch(
        sizes in proptest::collection::vec(0usize..40, 1..4),
        threshold in 1usize..16,
    ) {
        let flow = flow(Config::in_memory().with_spill_threshold(SpillThreshold::Tuples(threshold)));
        let mut gate = flow.cogroup_gate(0, key_fields(sizes.len()));

        let expected: Vec<Vec<Tuple>> = sizes
            .iter()
            .enumerate()
            .map(|(branch, &n)| (0..n).map(|i| tuple![branch as i64, i as i64]).collect())
            .collect();
        let input: Vec<_> = expected
            .iter()
            .enumerate()
            .flat_map(|(branch, rows)| rows.iter().cloned().map(move |t| (branch, t)))
            .collect();
        gate.reset(tuple!["k"], source_from_pairs(input)).unwrap();

        // last branch first, so branch 0 is materialized rather than streamed
        for (branch, rows) in expected.iter().enumerate().rev() {
            prop_assert_eq!(gate.is_empty(branch).unwrap(), rows.is_empty());
            prop_assert_eq!(&drain(&mut gate, branch), rows);
        }
    }
}
