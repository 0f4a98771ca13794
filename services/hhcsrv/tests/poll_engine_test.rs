//! Poll engine integration tests
//!
//! Drives the engine through the register simulator: decoding, failure isolation,
//! the re-entrancy guard and the subscriber-driven scheduler lifecycle.

mod support;

use std::time::Duration;

use support::{build_engine, fast_options, settle, EventRecorder};
use hhcsrv::catalog::heat_control_points;
use hhcsrv::{
    ConnectionState, DecodeRule, DecodedValue, Point, PollState, RegisterSimulator, StatusFamily,
    TickOutcome, UpdateEvent,
};

fn five_temperatures() -> Vec<Point> {
    // Spread out so every point is its own read
    (0..5u16)
        .map(|i| Point::new(format!("t{}", i + 1), 0, 20 + i * 2, DecodeRule::SignedTemperature))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_enum_status_end_to_end() {
    let sim = RegisterSimulator::new();
    sim.set_register(1, 40, 5);
    let engine = build_engine(
        &sim,
        vec![Point::new(
            "heatcircuit_1_status",
            1,
            40,
            DecodeRule::EnumStatus(StatusFamily::HeatCircuit.into()),
        )],
        fast_options(),
    );

    let recorder = EventRecorder::new();
    let handle = engine.subscribe(recorder.observer()).await;
    settle().await;

    assert_eq!(
        engine.get_value("heatcircuit_1_status"),
        DecodedValue::Text("Tagbetrieb - Manuell".into())
    );
    assert_eq!(
        recorder.events(),
        vec![UpdateEvent::Poll {
            updated: vec!["heatcircuit_1_status".to_string()]
        }]
    );
    assert_eq!(sim.read_log(), vec![(1, 40, 1)]);

    engine.unsubscribe(handle).await;
}

#[tokio::test(start_paused = true)]
async fn test_single_point_failure_is_isolated() {
    let sim = RegisterSimulator::new();
    for i in 0..5u16 {
        sim.set_register(0, 20 + i * 2, 100 + i);
    }
    let engine = build_engine(&sim, five_temperatures(), fast_options());
    let recorder = EventRecorder::new();
    let handle = engine.subscribe(recorder.observer()).await;
    settle().await;
    assert_eq!(engine.get_value("t3"), DecodedValue::Numeric(10.2));
    assert_eq!(recorder.poll_events(), 1);
    recorder.clear();

    // New readings everywhere, but point 3 stops answering
    for i in 0..5u16 {
        sim.set_register(0, 20 + i * 2, 200 + i);
    }
    sim.fail_address(24);

    assert_eq!(
        engine.tick_now().await,
        TickOutcome::Completed {
            decoded: 4,
            failed: 1
        }
    );
    assert_eq!(engine.get_value("t1"), DecodedValue::Numeric(20.0));
    assert_eq!(engine.get_value("t2"), DecodedValue::Numeric(20.1));
    assert_eq!(engine.get_value("t3"), DecodedValue::Numeric(10.2));
    assert_eq!(engine.get_value("t4"), DecodedValue::Numeric(20.3));
    assert_eq!(engine.get_value("t5"), DecodedValue::Numeric(20.4));

    assert_eq!(
        recorder.events(),
        vec![UpdateEvent::Poll {
            updated: vec!["t1".into(), "t2".into(), "t4".into(), "t5".into()]
        }]
    );
    assert_eq!(engine.stats().point_failures, 1);

    engine.unsubscribe(handle).await;
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_tick_is_skipped() {
    let sim = RegisterSimulator::new();
    sim.set_read_delay(Some(Duration::from_millis(500)));
    let engine = build_engine(&sim, five_temperatures(), fast_options());

    let (first, second) = tokio::join!(engine.tick_now(), engine.tick_now());
    let outcomes = [first, second];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == TickOutcome::Skipped)
            .count(),
        1
    );
    assert!(outcomes.contains(&TickOutcome::Completed {
        decoded: 5,
        failed: 0
    }));
    // Exactly one pass over the registry
    assert_eq!(sim.counters().reads, 5);
    assert_eq!(engine.stats().ticks_skipped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_never_overlaps_ticks() {
    let sim = RegisterSimulator::new();
    // Each tick takes 1.5 intervals
    sim.set_read_delay(Some(Duration::from_millis(1500)));
    let engine = build_engine(
        &sim,
        vec![Point::new("outsidetemperature", 0, 20, DecodeRule::SignedTemperature)],
        fast_options(),
    );

    let recorder = EventRecorder::new();
    let handle = engine.subscribe(recorder.observer()).await;
    tokio::time::sleep(Duration::from_millis(5200)).await;

    let stats = engine.stats();
    assert!(stats.ticks_skipped >= 1, "stats: {stats:?}");
    let reads = sim.counters().reads as u64;
    assert!(reads <= stats.ticks_total + 1, "reads {reads}, stats {stats:?}");
    assert_eq!(recorder.poll_events() as u64, stats.ticks_successful);

    engine.unsubscribe(handle).await;
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_lifecycle() {
    let sim = RegisterSimulator::new();
    let engine = build_engine(&sim, heat_control_points(0), fast_options());
    assert_eq!(engine.state(), PollState::Idle);

    let first = engine.subscribe(EventRecorder::new().observer()).await;
    assert_ne!(engine.state(), PollState::Idle);
    let second = engine.subscribe(EventRecorder::new().observer()).await;
    settle().await;
    assert_eq!(engine.connection_state(), ConnectionState::Connected);
    assert_eq!(engine.subscriber_count(), 2);

    assert!(engine.unsubscribe(first).await);
    assert_ne!(engine.state(), PollState::Idle);
    assert_eq!(sim.counters().closes, 0);

    assert!(engine.unsubscribe(second).await);
    assert_eq!(engine.state(), PollState::Idle);
    assert_eq!(sim.counters().closes, 1);
    assert_eq!(engine.connection_state(), ConnectionState::Disconnected);
    assert!(!sim.is_link_up());

    // Timer is gone: no more reads
    let reads = sim.counters().reads;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sim.counters().reads, reads);

    assert!(!engine.unsubscribe(second).await);
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_restarts_polling() {
    let sim = RegisterSimulator::new();
    sim.set_register(0, 20, 150);
    let engine = build_engine(
        &sim,
        vec![Point::new("outsidetemperature", 0, 20, DecodeRule::SignedTemperature)],
        fast_options(),
    );

    let handle = engine.subscribe(EventRecorder::new().observer()).await;
    settle().await;
    engine.unsubscribe(handle).await;

    sim.set_register(0, 20, 175);
    let recorder = EventRecorder::new();
    let handle = engine.subscribe(recorder.observer()).await;
    settle().await;
    assert_eq!(engine.get_value("outsidetemperature"), DecodedValue::Numeric(17.5));
    assert_eq!(recorder.poll_events(), 1);
    assert_eq!(sim.counters().connects, 2);
    engine.unsubscribe(handle).await;
}

#[tokio::test]
async fn test_full_catalog_tick() {
    let sim = RegisterSimulator::new();
    // fbl 2.1.0, appl 3.4.7
    sim.set_registers(0, 0, &[0x0201, 0x0003, 0x0407, 0x0000]);
    sim.set_register(0, 114, 0xFFFE);
    sim.set_register(0, 115, 425);
    sim.set_register(0, 21, 0x7FFF);
    sim.set_register(0, 44, 101);
    sim.set_register(0, 170, 5);

    let engine = build_engine(&sim, heat_control_points(0), fast_options());
    let outcome = engine.tick_now().await;
    assert!(matches!(outcome, TickOutcome::Completed { failed: 0, .. }));

    assert_eq!(engine.get_value("fbl_sw_version"), DecodedValue::Text("2.1.0".into()));
    assert_eq!(engine.get_value("appl_sw_version"), DecodedValue::Text("3.4.7".into()));
    assert_eq!(engine.get_value("bufferstorage_1_filllevel"), DecodedValue::Unavailable);
    assert_eq!(engine.get_value("bufferstorage_2_filllevel"), DecodedValue::Numeric(42.5));
    assert_eq!(
        engine.get_value("room1temperature"),
        DecodedValue::Unknown(Some("Fehler".into()))
    );
    assert_eq!(engine.get_value("heatcircuit_1_mixerposition"), DecodedValue::Unavailable);
    assert_eq!(engine.get_value("woodburner_status"), DecodedValue::Text("Brennt".into()));
    assert_eq!(
        engine.get_value("doorbell_status"),
        DecodedValue::Text("Nicht verbaut".into())
    );
    // Buttons are never read back
    assert!(!engine
        .get_all_values()
        .contains_key("warmwater_boiler_manualChargeRequest"));
}
