//! Built-in register map of the Home Heat Control unit
//!
//! Point keys are a public contract: subscribers and stored host state refer to them,
//! so they keep the controller's historic spellings.

use crate::codec::{DecodeRule, StatusFamily, VersionHalf};
use crate::point::{Actuator, Point};

const CELSIUS: &str = "°C";
const KELVIN: &str = "K";
const PERCENT: &str = "%";

fn temperature(unit_id: u8, address: u16, key: impl Into<String>) -> Point {
    Point::new(key, unit_id, address, DecodeRule::SignedTemperature).with_unit(CELSIUS)
}

fn status(unit_id: u8, address: u16, key: impl Into<String>, family: StatusFamily) -> Point {
    Point::new(key, unit_id, address, DecodeRule::EnumStatus(family.into()))
}

fn flag(unit_id: u8, address: u16, key: impl Into<String>) -> Point {
    Point::new(key, unit_id, address, DecodeRule::BooleanFlag)
}

fn percentage(unit_id: u8, address: u16, key: impl Into<String>, unit: &str) -> Point {
    Point::new(key, unit_id, address, DecodeRule::Percentage).with_unit(unit)
}

fn fill_level(unit_id: u8, address: u16, key: &str) -> Point {
    Point::new(key, unit_id, address, DecodeRule::FillLevel).with_unit(PERCENT)
}

fn button(unit_id: u8, address: u16, key: &str, pressed_value: u16) -> Point {
    Point::new(key, unit_id, address, DecodeRule::WriteOnly)
        .with_actuator(Actuator::Button { pressed_value })
}

fn number(
    unit_id: u8,
    address: u16,
    key: String,
    factor: f64,
    (min, max, step): (f64, f64, f64),
) -> Point {
    Point::new(key, unit_id, address, DecodeRule::Scaled { factor })
        .with_actuator(Actuator::Number { min, max, step })
}

/// Register block of heat circuit `n` (1..=3), starting at `base`
fn heat_circuit(unit_id: u8, n: u8, base: u16) -> Vec<Point> {
    let key = |suffix: &str| format!("heatcircuit_{n}_{suffix}");
    vec![
        status(unit_id, base, key("status"), StatusFamily::HeatCircuit),
        status(unit_id, base + 1, key("pumpstatus"), StatusFamily::Pump),
        status(unit_id, base + 2, key("mixerstatus"), StatusFamily::Mixer),
        flag(unit_id, base + 3, key("mixernormed")),
        percentage(unit_id, base + 4, key("mixerposition"), PERCENT),
        percentage(unit_id, base + 5, key("targetForerunTemperature"), CELSIUS),
        temperature(unit_id, base + 6, key("forerunTemperature")),
        temperature(unit_id, base + 7, key("returnflowTemperature")),
        number(unit_id, base + 16, key("curve_inclination"), 0.1, (0.2, 3.5, 0.1)),
        number(unit_id, base + 17, key("curve_niveau"), 1.0, (-30.0, 30.0, 1.0))
            .with_unit(KELVIN),
        number(unit_id, base + 18, key("curve_targettemperature_day"), 1.0, (0.0, 40.0, 1.0))
            .with_unit(CELSIUS),
        number(unit_id, base + 19, key("curve_targettemperature_night"), 1.0, (0.0, 40.0, 1.0))
            .with_unit(CELSIUS),
    ]
}

/// Full point list of the controller at `unit_id`
pub fn heat_control_points(unit_id: u8) -> Vec<Point> {
    let u = unit_id;
    let mut points = vec![
        // System
        Point::new("fbl_sw_version", u, 0, DecodeRule::VersionPair(VersionHalf::Bootloader)),
        Point::new("appl_sw_version", u, 0, DecodeRule::VersionPair(VersionHalf::Application)),
        flag(u, 3, "dtcactive"),
        temperature(u, 20, "outsidetemperature"),
        temperature(u, 21, "room1temperature"),
        temperature(u, 22, "room2temperature"),
        status(u, 25, "doorbell_status", StatusFamily::Doorbell),
        flag(u, 30, "heatcontrolmanagement_enabled").with_actuator(Actuator::Switch),
        flag(u, 31, "heatcontrolmanagement_lowTemperatureWarning"),
    ];

    points.extend(heat_circuit(u, 1, 40));
    points.extend(heat_circuit(u, 2, 60));
    points.extend(heat_circuit(u, 3, 80));

    // Buffer storage
    points.push(status(u, 100, "bufferstorage_status", StatusFamily::BufferStorage));
    for (n, base) in [(1, 101), (2, 105)] {
        for (i, position) in ["top", "middletop", "middlebottom", "bottom"].iter().enumerate() {
            points.push(temperature(
                u,
                base + i as u16,
                format!("bufferstorage_{n}_temperature_{position}"),
            ));
        }
    }
    points.extend([
        status(u, 109, "bufferstorage_charge_or_switch_mixerstatus", StatusFamily::Mixer),
        flag(u, 110, "bufferstorage_charge_or_switch_mixernormed"),
        percentage(u, 111, "bufferstorage_charge_or_switch_mixerposition", PERCENT),
        status(u, 112, "bufferstorage_chargepumpstatus", StatusFamily::Pump),
        temperature(u, 113, "bufferstorage_chargewatertemperature"),
        fill_level(u, 114, "bufferstorage_1_filllevel"),
        fill_level(u, 115, "bufferstorage_2_filllevel"),
        fill_level(u, 116, "bufferstorage_combined_filllevel"),
        status(u, 117, "bufferstorage_active_status", StatusFamily::BufferActive),
        status(u, 118, "bufferstorage_chargevalvestatus", StatusFamily::Valve),
        status(u, 119, "bufferstorage_chargestatus", StatusFamily::BufferCharge),
        flag(u, 120, "bufferstorage_chargeElectricOnly").with_actuator(Actuator::Switch),
    ]);

    // Warm water
    points.extend([
        status(u, 140, "warmwater_boiler_status", StatusFamily::Boiler),
        temperature(u, 141, "warmwater_boiler_temperature"),
        status(u, 142, "warmwater_boiler_chargepumpstatus", StatusFamily::Pump),
        status(u, 143, "warmwater_boiler_valvestatus", StatusFamily::Valve),
        flag(u, 144, "warmwater_boiler_manualChargeActive"),
        button(u, 144, "warmwater_boiler_manualChargeRequest", 1),
        button(u, 144, "warmwater_boiler_manualChargeRequestEnd", 2),
        flag(u, 147, "warmwater_bath_heatingactive"),
        temperature(u, 150, "warmwater_circulation_outputtemperature"),
        status(u, 151, "warmwater_circulation_pumpstatus", StatusFamily::Pump),
    ]);
    for (n, base) in [(1u8, 152u16), (2, 156)] {
        let key = |suffix: &str| format!("warmwater_circulation_circuit{n}_{suffix}");
        points.extend([
            status(u, base, key("status"), StatusFamily::CirculationCircuit),
            temperature(u, base + 1, key("temperature")),
            status(u, base + 2, key("valvestatus"), StatusFamily::Valve),
            button(u, base + 3, &key("request_start"), 1),
            button(u, base + 3, &key("request_stop"), 2),
        ]);
    }

    // Burners
    points.extend([
        status(u, 170, "woodburner_status", StatusFamily::Burner),
        temperature(u, 171, "woodburner_exhaust_temperature"),
        temperature(u, 172, "woodburner_water_temperature"),
        status(u, 180, "gasburner_status", StatusFamily::Burner),
        temperature(u, 181, "gasburner_exhaust_temperature"),
        temperature(u, 182, "gasburner_water_temperature"),
    ]);

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::PointKind;
    use crate::registry::PointRegistry;

    #[test]
    fn test_catalog_is_valid() {
        let registry = PointRegistry::new(heat_control_points(0)).unwrap();
        assert!(registry.len() > 90);
        assert!(registry.iter().all(|p| p.unit_id == 0));
    }

    #[test]
    fn test_catalog_addresses() {
        let registry = PointRegistry::new(heat_control_points(2)).unwrap();
        let addr = |k: &str| registry.get(k).unwrap().address;
        assert_eq!(addr("heatcircuit_2_mixerstatus"), 62);
        assert_eq!(addr("heatcircuit_3_returnflowTemperature"), 87);
        assert_eq!(addr("heatcircuit_1_curve_inclination"), 56);
        assert_eq!(addr("heatcircuit_3_curve_targettemperature_night"), 99);
        assert_eq!(addr("bufferstorage_2_temperature_bottom"), 108);
        assert_eq!(addr("warmwater_circulation_circuit2_valvestatus"), 158);
        assert_eq!(addr("warmwater_circulation_circuit2_request_stop"), 159);
        assert_eq!(registry.get("gasburner_status").unwrap().unit_id, 2);
    }

    #[test]
    fn test_catalog_kinds() {
        let registry = PointRegistry::new(heat_control_points(0)).unwrap();
        assert_eq!(
            registry.get("bufferstorage_combined_filllevel").unwrap().kind,
            PointKind::FillLevel
        );
        assert!(matches!(
            registry.get("heatcontrolmanagement_enabled").unwrap().kind,
            PointKind::Actuator(Actuator::Switch)
        ));
        assert!(!registry
            .get("warmwater_boiler_manualChargeRequestEnd")
            .unwrap()
            .is_polled());
        assert_eq!(
            registry.get("appl_sw_version").unwrap().width,
            registry.get("fbl_sw_version").unwrap().width
        );
    }
}
