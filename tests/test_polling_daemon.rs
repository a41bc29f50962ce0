mod common;
use common::*;

use cryo_bridge::daemon::commands::power::SetPower;
use cryo_bridge::prelude::*;
use cryo_bridge::retry::RetryPolicy;

use std::sync::{Arc, Barrier};
use std::time::Duration;

fn daemon(slots: Vec<DeviceSlot>, telemetry: &Arc<RecordingTelemetry>) -> PollingDaemon {
    PollingDaemon::new(
        slots.into_iter().map(Arc::new).collect(),
        telemetry.clone(),
        Duration::from_millis(10),
    )
}

#[test]
fn poll_connects_and_reports_good() {
    common_setup();

    let device = Factory::v3_device();
    let slot = Factory::slot("cp1", &device);
    assert!(!slot.is_connected());

    let report = slot.poll();

    assert!(slot.is_connected());
    assert_eq!(report.key, "cp1");
    assert_eq!(report.status, CommStatus::Good);
    assert_eq!(report.comm_error(), "None");
    assert!(report.readings.contains_key("coolant_in"));
    assert!(report.readings.contains_key("serial"));
}

#[test]
fn logged_data_limits_readings() {
    common_setup();

    let slot = Factory::slot("cp1", &Factory::v3_device())
        .with_logged_data(vec!["state".to_string(), "coolant_in".to_string()]);

    let report = slot.poll();

    let names: Vec<&str> = report.readings.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["coolant_in", "state"]);
}

#[test]
fn connect_failure_is_connection_error_and_retried_next_cycle() {
    common_setup();

    let device = Factory::v3_device();
    device.lock().unwrap().refuse_connect = true;
    let slot = Factory::slot("cp1", &device);

    let report = slot.poll();
    assert_eq!(report.status, CommStatus::ConnectionError);
    assert!(report.readings.is_empty());
    assert_ne!(report.comm_error(), "None");
    assert!(!slot.is_connected());

    device.lock().unwrap().refuse_connect = false;
    let report = slot.poll();
    assert_eq!(report.status, CommStatus::Good);
}

#[test]
fn transient_failures_within_retry_are_not_stale() {
    common_setup();

    let device = Factory::v3_device();
    let slot = Factory::slot("cp1", &device);
    slot.poll();

    device.lock().unwrap().fail_reads = 2;
    let report = slot.poll();

    assert_eq!(report.status, CommStatus::Good);
}

#[test]
fn persistent_failure_is_stale_for_that_cycle_only() {
    common_setup();

    let device = Factory::v3_device();
    let slot = Factory::slot("cp1", &device);
    assert_eq!(slot.poll().status, CommStatus::Good);

    // both update attempts exhaust their retries
    device.lock().unwrap().fail_reads = 6;
    let report = slot.poll();

    assert_eq!(report.status, CommStatus::Stale);
    assert!(report.comm_error().contains("transport"));
    // last known values are still published
    assert!(report.readings.contains_key("coolant_in"));
    assert!(slot.is_connected());

    let report = slot.poll();
    assert_eq!(report.status, CommStatus::Good);
}

#[test]
fn five_attempt_policy_goes_stale_only_when_both_updates_exhaust_it() {
    common_setup();

    let device = Factory::v3_device();
    let slot = Factory::slot_with_retry("cp1", &device, RetryPolicy::immediate(5));
    assert_eq!(slot.poll().status, CommStatus::Good);

    // four failures fit inside one read's five attempts
    device.lock().unwrap().fail_reads = 4;
    assert_eq!(slot.poll().status, CommStatus::Good);

    // five per update attempt, and the update is tried twice
    device.lock().unwrap().fail_reads = 10;
    let report = slot.poll();
    assert_eq!(report.status, CommStatus::Stale);
    assert!(report.comm_error().contains("transport"));
    assert_eq!(device.lock().unwrap().fail_reads, 0);

    assert_eq!(slot.poll().status, CommStatus::Good);
}

#[test]
fn one_failing_slot_does_not_stop_the_cycle() {
    common_setup();

    let broken = Factory::v3_device();
    broken.lock().unwrap().refuse_connect = true;
    let telemetry = Arc::new(RecordingTelemetry::default());
    let daemon = daemon(
        vec![
            Factory::slot("broken", &broken),
            Factory::slot("cp2", &Factory::v3_device()),
        ],
        &telemetry,
    );

    let reports = daemon.poll_cycle();

    assert_eq!(reports.len(), 2);
    let published = telemetry.readings();
    assert_eq!(published[0].status, CommStatus::ConnectionError);
    assert_eq!(published[1].status, CommStatus::Good);
}

#[test]
fn start_polls_publishes_units_applies_defaults_and_subscribes() {
    common_setup();

    let device = Factory::cpa28i6_device();
    let telemetry = Arc::new(RecordingTelemetry::default());
    let daemon = daemon(
        vec![Factory::slot("cp1", &device).with_default_frequency(Some(55.0))],
        &telemetry,
    );

    daemon.start().unwrap();

    assert_eq!(telemetry.readings().len(), 1);
    let units = telemetry.units.lock().unwrap().clone();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].0, "cp1");
    assert_eq!(units[0].1.get("coolant_in"), Some(&Some("F")));
    assert_eq!(units[0].1.get("inverter_frequency"), Some(&Some("Hz")));
    assert_eq!(device.lock().unwrap().writes(), vec![Op::Write(3, vec![550])]);
    assert_eq!(telemetry.subscribed(), vec!["cp1".to_string()]);
}

#[test]
fn slot_offline_at_start_is_set_up_on_first_connect() {
    common_setup();

    let device = Factory::cpa28i6_device();
    device.lock().unwrap().refuse_connect = true;
    let telemetry = Arc::new(RecordingTelemetry::default());
    let daemon = daemon(
        vec![Factory::slot("cp1", &device).with_default_frequency(Some(55.0))],
        &telemetry,
    );

    daemon.start().unwrap();

    assert!(telemetry.units.lock().unwrap().is_empty());
    assert!(device.lock().unwrap().writes().is_empty());
    assert_eq!(telemetry.subscribed(), vec!["cp1".to_string()]);

    device.lock().unwrap().refuse_connect = false;
    daemon.poll_cycle();
    daemon.poll_cycle();

    let statuses: Vec<CommStatus> = telemetry.readings().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![CommStatus::ConnectionError, CommStatus::Good, CommStatus::Good]
    );
    // units and the default frequency go out once, on the connecting cycle
    let units = telemetry.units.lock().unwrap().clone();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].0, "cp1");
    assert_eq!(units[0].1.get("inverter_frequency"), Some(&Some("Hz")));
    assert_eq!(device.lock().unwrap().writes(), vec![Op::Write(3, vec![550])]);
}

#[test]
fn run_polls_until_shutdown() {
    common_setup();

    let telemetry = Arc::new(RecordingTelemetry::default());
    let daemon = Arc::new(daemon(
        vec![Factory::slot("cp1", &Factory::v3_device())],
        &telemetry,
    ));

    let (tx, rx) = std::sync::mpsc::channel();
    let handle = {
        let daemon = daemon.clone();
        std::thread::spawn(move || daemon.run(&rx))
    };

    std::thread::sleep(Duration::from_millis(100));
    tx.send(()).unwrap();
    handle.join().unwrap();

    assert!(telemetry.readings().len() >= 2);

    daemon.shutdown().unwrap();
    assert!(!daemon.slots()[0].is_connected());
}

#[test]
fn power_command_is_applied() {
    common_setup();

    let device = Factory::v3_device();
    let telemetry = Arc::new(RecordingTelemetry::default());
    let daemon = daemon(vec![Factory::slot("cp1", &device)], &telemetry);
    daemon.poll_cycle();

    daemon.handle(Command::Power {
        key: "cp1".to_string(),
        on: true,
    });

    assert!(telemetry.failures().is_empty());
    assert_eq!(device.lock().unwrap().writes(), vec![Op::Write(1, vec![0x0001])]);
}

#[test]
fn failed_commands_publish_failure() {
    common_setup();

    let device = Factory::v3_device();
    let telemetry = Arc::new(RecordingTelemetry::default());
    let daemon = daemon(vec![Factory::slot("cp1", &device)], &telemetry);

    // not connected yet
    let power = Command::Power {
        key: "cp1".to_string(),
        on: true,
    };
    daemon.handle(power.clone());

    daemon.poll_cycle();

    // no inverter on this compressor
    let frequency = Command::Frequency {
        key: "cp1".to_string(),
        hz: 55.0,
    };
    daemon.handle(frequency.clone());

    let out_of_range = Command::Frequency {
        key: "cp1".to_string(),
        hz: 80.0,
    };
    daemon.handle(out_of_range.clone());

    let unknown = Command::Power {
        key: "nope".to_string(),
        on: false,
    };
    daemon.handle(unknown.clone());

    assert_eq!(
        telemetry.failures(),
        vec![power, frequency, out_of_range, unknown]
    );
    assert!(device.lock().unwrap().writes().is_empty());
    assert_eq!(
        telemetry.failures()[3].to_result_topic(),
        "result/nope/power"
    );
}

#[test]
fn commands_do_not_interleave_with_polling() {
    common_setup();

    let device = Factory::v3_device();
    let slot = Arc::new(Factory::slot("cp1", &device));
    slot.poll();
    {
        let mut d = device.lock().unwrap();
        d.clear_ops();
        d.op_delay = Duration::from_millis(2);
    }

    let barrier = Arc::new(Barrier::new(2));
    let commander = {
        let slot = slot.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            barrier.wait();
            SetPower::new(slot, false).run()
        })
    };

    barrier.wait();
    let report = slot.poll();
    commander.join().unwrap().unwrap();

    assert_eq!(report.status, CommStatus::Good);

    let threads: Vec<_> = device
        .lock()
        .unwrap()
        .ops
        .iter()
        .map(|(thread, _)| *thread)
        .collect();
    let switches = threads.windows(2).filter(|w| w[0] != w[1]).count();
    assert!(threads.len() > 20);
    assert!(switches <= 1, "register sequences interleaved: {} switches", switches);
}
