//! End-to-end scenarios: build a network, run instants, check cells.

use std::io::Write;

use fixpoint_runtime::actors::{Const, FnActor, Map, Pre, Recorder, Seed, Zip2};
use fixpoint_runtime::{
    ActorId, Director, DirectorConfig, Error, Network, PortSpec, StopReason, TieBreak, UnresolvedPolicy,
    Value, Warning,
};
use fixpoint_tests::{NetworkHarness, absent, present, unknown};

/// A (source, 1) -> B (+1) -> C (*2) -> environment
fn linear_chain() -> Network {
    let mut net = Network::new();
    net.add_actor("A", Const::new(1i64)).unwrap();
    net.add_actor("B", Map::add(1)).unwrap();
    net.add_actor("C", Map::scale(2)).unwrap();
    net.connect("A.out", "B.in").unwrap();
    net.connect("B.out", "C.in").unwrap();
    net.expose_output("C.out", "out").unwrap();
    net
}

#[test]
fn test_linear_chain() {
    let mut harness = NetworkHarness::new(linear_chain());
    let report = harness.instant().clone();

    assert_eq!(harness.cell("A.out", "B.in"), present(1i64));
    assert_eq!(harness.cell("B.out", "C.in"), present(2i64));
    assert_eq!(harness.output("out"), Some(Some(&Value::Integer(4))));

    // One productive round plus one that confirms nothing changed; never
    // more rounds than schedule entries plus that confirmation.
    let schedule_len = harness.director().schedule().len();
    assert_eq!(report.rounds, 2);
    assert!(report.rounds <= schedule_len + 1);
    assert!(report.newly_excluded.is_empty());
    assert!(harness.director().excluded().is_empty());

    let second = harness.instant().clone();
    assert_eq!(second.snapshot(), report.snapshot());
    assert_eq!(second.rounds, report.rounds);
}

#[test]
fn test_excluded_actor_stays_silent() {
    let mut net = Network::new();
    net.add_actor("src", Const::new(5i64).with_firing_limit(2)).unwrap();
    net.add_actor("inc", Map::add(1)).unwrap();
    let (recorder, log) = Recorder::new();
    net.add_actor("rec", recorder).unwrap();
    net.connect("src.out", "inc.in").unwrap();
    net.connect("inc.out", "rec.in").unwrap();

    let mut harness = NetworkHarness::new(net);
    harness.instant();
    assert!(harness.last().newly_excluded.is_empty());
    harness.instant();
    assert_eq!(harness.last().newly_excluded, vec!["src".to_string()]);

    for _ in 0..3 {
        harness.instant();
        assert_eq!(harness.cell("src.out", "inc.in"), unknown());
        assert_eq!(harness.cell("inc.out", "rec.in"), unknown());
        assert_eq!(harness.last().firings, 0);
    }

    // The recorder only committed while its input was known.
    assert_eq!(
        log.entries(),
        vec![Some(Value::Integer(6)), Some(Value::Integer(6))]
    );
}

#[test]
fn test_non_strict_cycle_converges() {
    let mut net = Network::new();
    net.add_actor("seed", Seed::new(10i64)).unwrap();
    net.add_actor("inc", Map::add(1)).unwrap();
    net.connect("seed.out", "inc.in").unwrap();
    net.connect("inc.out", "seed.in").unwrap();
    net.expose_output("inc.out", "out").unwrap();

    let mut harness = NetworkHarness::new(net);
    assert!(harness.director().schedule().warnings().is_empty());

    let report = harness.instant();
    assert!(report.is_fully_resolved());
    assert!(report.rounds <= 2 + 3 + 1);
    assert_eq!(harness.cell("seed.out", "inc.in"), present(10i64));
    assert_eq!(harness.cell("inc.out", "seed.in"), present(11i64));
}

#[test]
fn test_strict_cycle_stays_unknown() {
    let mut net = Network::new();
    net.add_actor("x", Map::add(1)).unwrap();
    net.add_actor("y", Map::add(1)).unwrap();
    net.connect("x.out", "y.in").unwrap();
    net.connect("y.out", "x.in").unwrap();

    let mut harness = NetworkHarness::new(net);
    let warnings = harness.director().schedule().warnings().to_vec();
    assert!(matches!(
        warnings.as_slice(),
        [Warning::CyclicDependency { names, .. }] if names == &["x", "y"]
    ));

    let report = harness.instant();
    assert_eq!(report.known_cells, 0);
    assert_eq!(report.unresolved.len(), 2);
    assert_eq!(harness.cell("x.out", "y.in"), unknown());
}

#[test]
fn test_contradiction_is_fatal_and_identified() {
    let mut net = Network::new();
    net.add_actor(
        "flip",
        FnActor::new(PortSpec::new().output("out"), |firing| {
            firing.assert_present(0, true)?;
            firing.assert_absent(0)
        }),
    )
    .unwrap();
    net.add_actor("sink", Map::add(0)).unwrap();
    net.connect("flip.out", "sink.in").unwrap();

    let mut harness = NetworkHarness::new(net);
    let err = harness.try_instant().unwrap_err();
    match err {
        Error::PresenceContradiction {
            channel,
            actor,
            existing,
            ..
        } => {
            assert_eq!(channel, "flip.out -> sink.in");
            assert_eq!(actor, "flip");
            assert_eq!(existing, Some(Value::Boolean(true)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(harness.reports().is_empty());
    assert_eq!(harness.director().instant(), 0);
}

#[test]
fn test_producers_disagreeing_on_feedback_signal() {
    // A non-strict actor on a loop changes its mind about the feedback
    // signal within one instant.
    let mut net = Network::new();
    net.add_actor("seed", Seed::new(1i64)).unwrap();
    net.add_actor(
        "echo",
        FnActor::new(PortSpec::new().input("in").output("out"), |firing| {
            let seen = firing.read(0)?;
            firing.assert_option(0, seen.map(|v| Value::Integer(v.as_integer().unwrap_or(0) + 1)))?;
            firing.assert_present(0, 100i64)
        })
        .non_strict(),
    )
    .unwrap();
    net.connect("seed.out", "echo.in").unwrap();
    net.connect("echo.out", "seed.in").unwrap();

    let mut harness = NetworkHarness::new(net);
    let err = harness.try_instant().unwrap_err();
    assert!(err.is_model_error());
    assert!(matches!(err, Error::NonMonotonicWrite { ref actor, .. } if actor == "echo"));
}

#[test]
fn test_unresolved_read_is_not_fatal_for_non_strict() {
    // A non-strict actor that propagates an unknown read with `?` is simply
    // not done yet.
    let mut net = Network::new();
    net.add_actor("late", Map::add(1)).unwrap();
    net.add_actor(
        "eager",
        FnActor::new(PortSpec::new().input("in").output("out"), |firing| {
            let v = firing.read(0)?;
            firing.assert_option(0, v)
        })
        .non_strict(),
    )
    .unwrap();
    net.connect("late.out", "eager.in").unwrap();
    net.expose_input("x", "late.in").unwrap();
    net.expose_output("eager.out", "y").unwrap();

    let mut harness = NetworkHarness::new(net);
    // Visit the consumer before its producer.
    harness
        .director()
        .override_schedule(vec![ActorId(1), ActorId(0)])
        .unwrap();
    harness.stage("x", Some(Value::Integer(1)));
    let report = harness.instant();
    assert_eq!(report.rounds, 3);
    assert_eq!(harness.output("y"), Some(Some(&Value::Integer(2))));
}

#[test]
fn test_pre_counter_across_instants() {
    let mut net = Network::new();
    net.add_actor("state", Pre::with_initial(0i64)).unwrap();
    net.add_actor("inc", Map::add(1)).unwrap();
    net.connect("state.out", "inc.in").unwrap();
    net.connect("inc.out", "state.in").unwrap();
    net.expose_output("inc.out", "count").unwrap();

    let mut harness = NetworkHarness::new(net);
    assert!(!harness.director().is_fire_functional());
    let mut counts = Vec::new();
    for _ in 0..4 {
        harness.instant();
        counts.push(harness.output("count").flatten().and_then(Value::as_integer));
    }
    assert_eq!(counts, vec![Some(1), Some(2), Some(3), Some(4)]);
}

#[test]
fn test_pre_without_initial_is_absent_first() {
    let mut net = Network::new();
    net.add_actor("delay", Pre::new()).unwrap();
    net.expose_input("x", "delay.in").unwrap();
    net.expose_output("delay.out", "y").unwrap();

    let mut harness = NetworkHarness::new(net);
    harness.stage("x", Some(Value::from("first")));
    harness.instant();
    assert_eq!(harness.output("y"), Some(None));

    harness.stage("x", Some(Value::from("second")));
    harness.instant();
    assert_eq!(harness.output("y"), Some(Some(&Value::from("first"))));
}

#[test]
fn test_zip_with_one_absent_input() {
    let mut net = Network::new();
    net.add_actor("zip", Zip2::sum()).unwrap();
    net.expose_input("a", "zip.a").unwrap();
    net.expose_input("b", "zip.b").unwrap();
    net.expose_output("zip.out", "sum").unwrap();

    let mut harness = NetworkHarness::new(net);
    harness.stage("a", Some(Value::Integer(2)));
    harness.stage("b", Some(Value::Integer(3)));
    harness.instant();
    assert_eq!(harness.output("sum"), Some(Some(&Value::Integer(5))));

    harness.stage("a", Some(Value::Integer(2)));
    harness.instant();
    assert_eq!(harness.output("sum"), Some(None));
}

#[test]
fn test_arithmetic_overflow_is_absent() {
    let mut net = Network::new();
    net.add_actor("max", Const::new(i64::MAX)).unwrap();
    net.add_actor("inc", Map::add(1)).unwrap();
    net.connect("max.out", "inc.in").unwrap();
    net.expose_output("inc.out", "out").unwrap();

    let mut harness = NetworkHarness::new(net);
    let report = harness.instant();
    assert!(report.is_fully_resolved());
    assert_eq!(harness.cell("max.out", "inc.in"), present(i64::MAX));
    assert_eq!(harness.output("out"), Some(None));
}

#[test]
fn test_silent_strict_actor_defines_absence() {
    let mut net = Network::new();
    net.add_actor(
        "quiet",
        FnActor::new(PortSpec::new().input("in").output("out"), |_| Ok(())),
    )
    .unwrap();
    net.add_actor("after", Map::add(1)).unwrap();
    net.connect("quiet.out", "after.in").unwrap();
    net.expose_input("x", "quiet.in").unwrap();
    net.expose_output("after.out", "y").unwrap();

    let mut harness = NetworkHarness::new(net);
    harness.stage("x", Some(Value::Integer(1)));
    harness.instant();
    assert_eq!(harness.cell("quiet.out", "after.in"), absent());
    assert_eq!(harness.output("y"), Some(None));
}

#[test]
fn test_tie_break_does_not_change_results() {
    let build = || {
        let mut net = Network::new();
        net.add_actor("l", Const::new(2i64)).unwrap();
        net.add_actor("r", Const::new(3i64)).unwrap();
        net.add_actor("sum", Zip2::sum()).unwrap();
        net.add_actor("neg", Map::scale(-1)).unwrap();
        net.connect("l.out", "sum.a").unwrap();
        net.connect("r.out", "sum.b").unwrap();
        net.connect("sum.out", "neg.in").unwrap();
        net.expose_output("neg.out", "out").unwrap();
        net
    };

    let mut forward = NetworkHarness::new(build());
    let mut reverse =
        NetworkHarness::with_config(build(), DirectorConfig::default().with_tie_break(TieBreak::Reverse));
    assert_ne!(
        forward.director().schedule().firings(),
        reverse.director().schedule().firings()
    );

    forward.instant();
    reverse.instant();
    assert_eq!(forward.last().snapshot(), reverse.last().snapshot());
    assert_eq!(forward.output("out"), Some(Some(&Value::Integer(-5))));
}

#[test]
fn test_config_file_drives_run() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "iterations: 4\nunresolved: warn\ntie_break: reverse").unwrap();
    let config = DirectorConfig::load(file.path()).unwrap();
    assert_eq!(config.unresolved, UnresolvedPolicy::Warn);

    let mut net = linear_chain();
    net.add_actor("orphan", Map::add(1)).unwrap();
    net.add_actor("feeds", Const::new(1i64).with_firing_limit(1)).unwrap();
    net.connect("feeds.out", "orphan.in").unwrap();

    let mut director = Director::with_config(net, config);
    let report = director.run().unwrap();
    assert_eq!(report.stopped_reason, StopReason::IterationsReached);
    assert_eq!(report.instants.len(), 4);
    assert!(report.instants[0].warnings.is_empty());
    assert!(matches!(
        report.instants[1].warnings.as_slice(),
        [Warning::UnresolvedSignals { instant: 1, .. }]
    ));
    assert_eq!(report.instants[3].output("out"), Some(Some(&Value::Integer(4))));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["stopped_reason"], "iterations_reached");
    assert_eq!(json["instants"][0]["outputs"]["out"], 4);
}

#[test]
fn test_topology_change_reschedules() {
    let mut harness = NetworkHarness::new(linear_chain());
    harness.instant();
    let before = harness.director().schedule().clone();

    let net = harness.director().network_mut();
    net.add_actor("D", Map::add(100)).unwrap();
    net.connect("C.out", "D.in").unwrap();
    net.expose_output("D.out", "late").unwrap();

    harness.instant();
    let after = harness.director().schedule().clone();
    assert_ne!(before.version(), after.version());
    assert_eq!(after.len(), 4);
    assert_eq!(harness.output("out"), Some(Some(&Value::Integer(4))));
    assert_eq!(harness.output("late"), Some(Some(&Value::Integer(104))));
}
