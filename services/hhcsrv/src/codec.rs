//! Register codec
//!
//! Pure functions turning raw holding-register words into [`DecodedValue`]s. Nothing
//! here fails: every raw value the device can report resolves to a numeric/text value
//! or to one of the sentinel variants.

use std::fmt;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    BOILER_STATUS, BUFFER_ACTIVE_STATUS, BUFFER_CHARGE_STATUS, BUFFER_STORAGE_STATUS,
    BURNER_STATUS, CIRCULATION_CIRCUIT_STATUS, DOORBELL_STATUS, FILL_LEVEL_INVALID,
    FILL_LEVEL_NOT_FITTED, HEAT_CIRCUIT_STATUS, LABEL_FAULT, LABEL_INIT, LABEL_INVALID,
    MIXER_STATUS, PERCENTAGE_MAX, PUMP_STATUS, TEMPERATURE_FAULT, TEMPERATURE_INIT,
    TEMPERATURE_NOT_FITTED, VALVE_STATUS,
};

// ============================================================================
// Decoded values
// ============================================================================

/// Typed result of interpreting a point's register words
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DecodedValue {
    Numeric(f64),
    Text(String),
    Boolean(bool),
    /// Sensor not fitted, invalid reading, or no fresh data from the device
    Unavailable,
    /// Raw value matched no known code; carries the device's label when it has one
    Unknown(Option<String>),
}

impl DecodedValue {
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Unavailable => f.write_str("unavailable"),
            Self::Unknown(Some(label)) => write!(f, "unknown ({label})"),
            Self::Unknown(None) => f.write_str("unknown"),
        }
    }
}

// ============================================================================
// Decode rules
// ============================================================================

/// Built-in status code families of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFamily {
    HeatCircuit,
    Pump,
    Mixer,
    Valve,
    BufferStorage,
    BufferActive,
    BufferCharge,
    Boiler,
    Burner,
    CirculationCircuit,
    Doorbell,
}

impl StatusFamily {
    pub fn codes(self) -> &'static [(u16, &'static str)] {
        match self {
            Self::HeatCircuit => HEAT_CIRCUIT_STATUS,
            Self::Pump => PUMP_STATUS,
            Self::Mixer => MIXER_STATUS,
            Self::Valve => VALVE_STATUS,
            Self::BufferStorage => BUFFER_STORAGE_STATUS,
            Self::BufferActive => BUFFER_ACTIVE_STATUS,
            Self::BufferCharge => BUFFER_CHARGE_STATUS,
            Self::Boiler => BOILER_STATUS,
            Self::Burner => BURNER_STATUS,
            Self::CirculationCircuit => CIRCULATION_CIRCUIT_STATUS,
            Self::Doorbell => DOORBELL_STATUS,
        }
    }
}

/// One `code -> label` entry of a configured status table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    pub code: u16,
    pub label: String,
}

impl StatusCode {
    pub fn new(code: u16, label: impl Into<String>) -> Self {
        Self {
            code,
            label: label.into(),
        }
    }
}

/// Ordered code table used by [`DecodeRule::EnumStatus`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusTable {
    Family(StatusFamily),
    Custom(Vec<StatusCode>),
}

impl StatusTable {
    /// Label for `code`; the first matching entry wins.
    pub fn label(&self, code: u16) -> Option<&str> {
        match self {
            Self::Family(family) => family
                .codes()
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, label)| *label),
            Self::Custom(entries) => entries
                .iter()
                .find(|e| e.code == code)
                .map(|e| e.label.as_str()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Family(family) => family.codes().len(),
            Self::Custom(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<StatusFamily> for StatusTable {
    fn from(family: StatusFamily) -> Self {
        Self::Family(family)
    }
}

/// Which half of the packed software version block a point renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionHalf {
    Bootloader,
    Application,
}

/// How a point's register words are interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeRule {
    /// INT16 × 0.1 with 0x7FFD..=0x7FFF sentinels
    SignedTemperature,
    /// UINT16 0..=100, anything above is invalid
    Percentage,
    /// UINT16 × 0.1 with 0xFFFE/0xFFFF sentinels
    FillLevel,
    BooleanFlag,
    EnumStatus(StatusTable),
    VersionPair(VersionHalf),
    /// High byte hour, low byte minute
    TimeOfDay,
    /// INT16 × factor
    Scaled { factor: f64 },
    /// Command register that is never read back
    WriteOnly,
}

impl DecodeRule {
    /// Register count the rule consumes by default
    pub fn default_width(&self) -> u16 {
        match self {
            Self::VersionPair(_) => 4,
            _ => 1,
        }
    }

    /// Whether `width` registers can be decoded by this rule
    pub fn accepts_width(&self, width: u16) -> bool {
        match self {
            Self::VersionPair(_) => width == 3 || width == 4,
            _ => width == 1,
        }
    }

    pub fn is_polled(&self) -> bool {
        !matches!(self, Self::WriteOnly)
    }
}

// ============================================================================
// Decode functions
// ============================================================================

/// Decode `words` according to `rule`.
///
/// A payload shorter than the rule needs decodes to `Unavailable`.
pub fn decode(rule: &DecodeRule, words: &[u16]) -> DecodedValue {
    let Some(&first) = words.first() else {
        debug!("Empty register payload for {:?}", rule);
        return DecodedValue::Unavailable;
    };

    match rule {
        DecodeRule::SignedTemperature => decode_signed_temperature(first),
        DecodeRule::Percentage => decode_percentage(first),
        DecodeRule::FillLevel => decode_fill_level(first),
        DecodeRule::BooleanFlag => decode_boolean(first),
        DecodeRule::EnumStatus(table) => decode_status(table, first),
        DecodeRule::VersionPair(half) => match decode_version_pair(words) {
            Some((bootloader, application)) => DecodedValue::Text(match half {
                VersionHalf::Bootloader => bootloader,
                VersionHalf::Application => application,
            }),
            None => {
                debug!("Version payload too short: {} registers", words.len());
                DecodedValue::Unavailable
            },
        },
        DecodeRule::TimeOfDay => {
            DecodedValue::Text(decode_time_of_day(first).format("%H:%M").to_string())
        },
        DecodeRule::Scaled { factor } => decode_scaled(first, *factor),
        DecodeRule::WriteOnly => DecodedValue::Unavailable,
    }
}

pub fn decode_signed_temperature(raw: u16) -> DecodedValue {
    match raw as i16 {
        TEMPERATURE_NOT_FITTED => DecodedValue::Unavailable,
        TEMPERATURE_INIT => DecodedValue::Unknown(Some(LABEL_INIT.to_string())),
        TEMPERATURE_FAULT => DecodedValue::Unknown(Some(LABEL_FAULT.to_string())),
        value => DecodedValue::Numeric(f64::from(value) / 10.0),
    }
}

pub fn decode_percentage(raw: u16) -> DecodedValue {
    if raw > PERCENTAGE_MAX {
        debug!("Percentage out of range: {}", raw);
        DecodedValue::Unavailable
    } else {
        DecodedValue::Numeric(f64::from(raw))
    }
}

pub fn decode_fill_level(raw: u16) -> DecodedValue {
    match raw {
        FILL_LEVEL_NOT_FITTED => DecodedValue::Unavailable,
        FILL_LEVEL_INVALID => DecodedValue::Unknown(Some(LABEL_INVALID.to_string())),
        value => DecodedValue::Numeric(f64::from(value) / 10.0),
    }
}

pub fn decode_boolean(raw: u16) -> DecodedValue {
    DecodedValue::Boolean(raw != 0)
}

pub fn decode_status(table: &StatusTable, raw: u16) -> DecodedValue {
    match table.label(raw) {
        Some(label) => DecodedValue::Text(label.to_string()),
        None => {
            debug!("Unknown status code {} for table {:?}", raw, table);
            DecodedValue::Unknown(None)
        },
    }
}

/// Render the packed version block as `(bootloader, application)` dotted triplets.
///
/// Registers are split big-endian into bytes; bytes 0..3 are the bootloader and bytes
/// 3..6 the application version. Needs at least 3 registers; a 4th is ignored.
pub fn decode_version_pair(words: &[u16]) -> Option<(String, String)> {
    if words.len() < 3 {
        return None;
    }
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    let triplet = |b: &[u8]| format!("{}.{}.{}", b[0], b[1], b[2]);
    Some((triplet(&bytes[0..3]), triplet(&bytes[3..6])))
}

/// Unpack a time-of-day register; out-of-range hour/minute reads as 00:00.
pub fn decode_time_of_day(raw: u16) -> NaiveTime {
    let [hour, minute] = raw.to_be_bytes();
    NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), 0).unwrap_or(NaiveTime::MIN)
}

pub fn encode_time_of_day(time: NaiveTime) -> u16 {
    ((time.hour() as u16) << 8) | time.minute() as u16
}

pub fn decode_scaled(raw: u16, factor: f64) -> DecodedValue {
    let value = f64::from(raw as i16) * factor;
    // Trim float noise from factors like 0.1
    DecodedValue::Numeric((value * 1000.0).round() / 1000.0)
}

/// Register word for `value` under `factor`, or `None` if it does not fit an INT16.
pub fn encode_scaled(value: f64, factor: f64) -> Option<u16> {
    if factor == 0.0 || !value.is_finite() {
        return None;
    }
    let raw = (value / factor).round();
    if raw < f64::from(i16::MIN) || raw > f64::from(i16::MAX) {
        return None;
    }
    Some(raw as i16 as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_temperature_sentinels() {
        assert_eq!(decode_signed_temperature(0x7FFD), DecodedValue::Unavailable);
        assert_eq!(
            decode_signed_temperature(0x7FFE),
            DecodedValue::Unknown(Some("Init".into()))
        );
        assert_eq!(
            decode_signed_temperature(0x7FFF),
            DecodedValue::Unknown(Some("Fehler".into()))
        );
    }

    #[test]
    fn test_signed_temperature_values() {
        assert_eq!(decode_signed_temperature(215), DecodedValue::Numeric(21.5));
        // -5.3 °C
        assert_eq!(
            decode_signed_temperature((-53i16) as u16),
            DecodedValue::Numeric(-5.3)
        );
        assert_eq!(decode_signed_temperature(0x7FFC), DecodedValue::Numeric(3276.4));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(decode_percentage(0), DecodedValue::Numeric(0.0));
        assert_eq!(decode_percentage(100), DecodedValue::Numeric(100.0));
        assert_eq!(decode_percentage(101), DecodedValue::Unavailable);
        assert_eq!(decode_percentage(0xFFFF), DecodedValue::Unavailable);
    }

    #[test]
    fn test_fill_level_range() {
        for v in 0u16..=1000 {
            assert_eq!(decode_fill_level(v), DecodedValue::Numeric(f64::from(v) / 10.0));
        }
        assert_eq!(decode_fill_level(0xFFFE), DecodedValue::Unavailable);
        assert_eq!(
            decode_fill_level(0xFFFF),
            DecodedValue::Unknown(Some("Ungültig".into()))
        );
    }

    #[test]
    fn test_boolean() {
        assert_eq!(decode_boolean(0), DecodedValue::Boolean(false));
        assert_eq!(decode_boolean(1), DecodedValue::Boolean(true));
        assert_eq!(decode_boolean(7), DecodedValue::Boolean(true));
    }

    #[test]
    fn test_status_families() {
        let hc = StatusTable::Family(StatusFamily::HeatCircuit);
        assert_eq!(
            decode_status(&hc, 5),
            DecodedValue::Text("Tagbetrieb - Manuell".into())
        );
        assert_eq!(decode_status(&hc, 8), DecodedValue::Unknown(None));

        let mixer = StatusTable::from(StatusFamily::Mixer);
        assert_eq!(
            decode_status(&mixer, 3),
            DecodedValue::Text("Öffen - Langsam".into())
        );
        let burner = StatusTable::from(StatusFamily::Burner);
        assert_eq!(decode_status(&burner, 5), DecodedValue::Text("Brennt".into()));
    }

    #[test]
    fn test_custom_table_first_match_wins() {
        let table = StatusTable::Custom(vec![
            StatusCode::new(1, "Aus"),
            StatusCode::new(2, "An"),
            StatusCode::new(2, "Shadowed"),
        ]);
        assert_eq!(table.label(2), Some("An"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_version_pair() {
        // bytes: 01 02 03 04 05 06 07 08
        let words = [0x0102, 0x0304, 0x0506, 0x0708];
        let (fbl, appl) = decode_version_pair(&words).unwrap();
        assert_eq!(fbl, "1.2.3");
        assert_eq!(appl, "4.5.6");

        let three = decode_version_pair(&words[..3]).unwrap();
        assert_eq!(three, (fbl, appl));
        assert!(decode_version_pair(&words[..2]).is_none());

        assert_eq!(
            decode(&DecodeRule::VersionPair(VersionHalf::Application), &words),
            DecodedValue::Text("4.5.6".into())
        );
    }

    #[test]
    fn test_time_of_day() {
        assert_eq!(
            decode_time_of_day(0x0617),
            NaiveTime::from_hms_opt(6, 23, 0).unwrap()
        );
        assert_eq!(decode_time_of_day(0x1900), NaiveTime::MIN);
        assert_eq!(decode_time_of_day(0x0A3C), NaiveTime::MIN);
        assert_eq!(
            decode(&DecodeRule::TimeOfDay, &[0x150A]),
            DecodedValue::Text("21:10".into())
        );

        let t = NaiveTime::from_hms_opt(22, 45, 0).unwrap();
        assert_eq!(decode_time_of_day(encode_time_of_day(t)), t);
    }

    #[test]
    fn test_scaled() {
        assert_eq!(decode_scaled(12, 0.1), DecodedValue::Numeric(1.2));
        assert_eq!(decode_scaled((-30i16) as u16, 1.0), DecodedValue::Numeric(-30.0));
        assert_eq!(encode_scaled(1.2, 0.1), Some(12));
        assert_eq!(encode_scaled(-30.0, 1.0), Some((-30i16) as u16));
        assert_eq!(encode_scaled(40000.0, 1.0), None);
        assert_eq!(encode_scaled(1.0, 0.0), None);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let rule = DecodeRule::EnumStatus(StatusFamily::Valve.into());
        assert_eq!(decode(&rule, &[4]), decode(&rule, &[4]));
        assert_eq!(decode(&rule, &[4]), DecodedValue::Text("Geschlossen".into()));
    }

    #[test]
    fn test_decode_empty_payload() {
        assert_eq!(
            decode(&DecodeRule::SignedTemperature, &[]),
            DecodedValue::Unavailable
        );
    }

    #[test]
    fn test_rule_widths() {
        let version = DecodeRule::VersionPair(VersionHalf::Bootloader);
        assert_eq!(version.default_width(), 4);
        assert!(version.accepts_width(3));
        assert!(!version.accepts_width(2));
        assert!(DecodeRule::FillLevel.accepts_width(1));
        assert!(!DecodeRule::FillLevel.accepts_width(4));
        assert!(!DecodeRule::WriteOnly.is_polled());
    }

    #[test]
    fn test_display() {
        assert_eq!(DecodedValue::Numeric(21.5).to_string(), "21.5");
        assert_eq!(
            DecodedValue::Unknown(Some("Init".into())).to_string(),
            "unknown (Init)"
        );
    }
}
