mod common;
use common::*;

use cryo_bridge::cryomech::InverterLink;
use cryo_bridge::snapshot::{ReadingValue, READING_NAMES};

#[test]
fn identity_only_before_first_update() {
    common_setup();

    let compressor = Factory::compressor(&Factory::v3_device());
    let snapshot = compressor.snapshot();

    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.get("serial").unwrap().value, ReadingValue::Int(1234));
    assert_eq!(
        snapshot.get("model").unwrap().value,
        ReadingValue::Text("CPA0801".to_string())
    );
    assert!(snapshot.taken_at.is_none());
}

#[test]
fn full_snapshot_after_update() {
    common_setup();

    let inverter = Factory::rs485_device();
    let mut compressor = Factory::compressor_with(
        &Factory::v3_device(),
        InverterLink::Rs485(Box::new(MockTransport::new("inverter", &inverter))),
    );
    compressor.update().unwrap();
    compressor.inverter_frequency_setting().unwrap();

    let snapshot = compressor.snapshot();

    // every known name is present for a v3 panel with an rs485 drive
    for name in READING_NAMES {
        assert!(snapshot.get(name).is_some(), "{} missing", name);
    }
    assert_eq!(snapshot.len(), READING_NAMES.len());

    let coolant = snapshot.get("coolant_in").unwrap();
    assert_eq!(coolant.value, ReadingValue::Float(65.0));
    assert_eq!(coolant.unit, Some("F"));
    assert_eq!(snapshot.get("low_pressure").unwrap().unit, Some("PSI"));
    assert_eq!(snapshot.get("inverter_power").unwrap().unit, Some("kW"));
    assert_eq!(
        snapshot.get("inverter_set_frequency").unwrap().value,
        ReadingValue::Float(60.0)
    );
    assert_eq!(snapshot.get("enabled").unwrap().value, ReadingValue::Bool(true));
    assert_eq!(
        snapshot.get("errors").unwrap().value,
        ReadingValue::Text("None".to_string())
    );
    assert!(snapshot.taken_at.is_some());
}

#[test]
fn select_filters_by_name() {
    common_setup();

    let mut compressor = Factory::compressor(&Factory::v2_device());
    compressor.update().unwrap();
    let snapshot = compressor.snapshot();

    let all = snapshot.select(&[]);
    assert_eq!(all.len(), snapshot.len());

    // rpm is not reported by v2 panels and is skipped
    let some = snapshot.select(&["hours".to_string(), "coldhead_rpm".to_string()]);
    assert_eq!(some.len(), 1);
    assert_eq!(some["hours"].value, ReadingValue::Float(20000.0));
}

#[test]
fn units_follow_panel_scales() {
    common_setup();

    let device = Factory::v3_device();
    {
        let mut d = device.lock().unwrap();
        d.input.insert(29, 1);
        d.input.insert(30, 2);
    }
    let mut compressor = Factory::compressor(&device);
    compressor.update().unwrap();

    let units = compressor.snapshot().units();
    assert_eq!(units["high_pressure"], Some("Bar"));
    assert_eq!(units["helium_temp"], Some("K"));
    assert_eq!(units["motor_current"], Some("A"));
    assert_eq!(units["state"], None);
}
