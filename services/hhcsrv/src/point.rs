//! Point definitions
//!
//! A point maps one logical value of the controller onto one register (or a small
//! group of registers) of a Modbus unit. Points are built once at startup and never
//! change afterwards.

use serde::{Deserialize, Serialize};

use crate::codec::DecodeRule;

/// One selectable option of a select actuator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: u16,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: u16) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Write capability of an actuator point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actuator {
    /// Writes 1 for on, 0 for off
    Switch,
    /// Writes a fixed command value
    Button { pressed_value: u16 },
    /// Writes the register value of the chosen option
    Select { options: Vec<SelectOption> },
    /// Writes hour/minute packed into one register
    Time,
    /// Writes a scaled signed value within `min..=max`
    Number { min: f64, max: f64, step: f64 },
}

/// Category of a point, fixed when the point is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    Measurement,
    EnumStatus,
    BooleanFlag,
    Percentage,
    FillLevel,
    VersionPair,
    Actuator(Actuator),
}

impl PointKind {
    /// Kind implied by a decode rule when no actuator is attached
    pub fn for_rule(rule: &DecodeRule) -> Self {
        match rule {
            DecodeRule::Percentage => Self::Percentage,
            DecodeRule::FillLevel => Self::FillLevel,
            DecodeRule::BooleanFlag => Self::BooleanFlag,
            DecodeRule::EnumStatus(_) => Self::EnumStatus,
            DecodeRule::VersionPair(_) => Self::VersionPair,
            DecodeRule::SignedTemperature
            | DecodeRule::TimeOfDay
            | DecodeRule::Scaled { .. }
            | DecodeRule::WriteOnly => Self::Measurement,
        }
    }
}

/// A polling and/or write point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    /// Stable identity; subscribers look values up by this key
    pub key: String,
    pub unit_id: u8,
    /// Starting holding register (0-based)
    pub address: u16,
    /// Number of registers consumed
    pub width: u16,
    pub rule: DecodeRule,
    pub kind: PointKind,
    /// Display unit, e.g. `°C` or `%`
    pub unit: Option<String>,
}

impl Point {
    pub fn new(key: impl Into<String>, unit_id: u8, address: u16, rule: DecodeRule) -> Self {
        Self {
            key: key.into(),
            unit_id,
            address,
            width: rule.default_width(),
            kind: PointKind::for_rule(&rule),
            rule,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_width(mut self, width: u16) -> Self {
        self.width = width;
        self
    }

    pub fn with_actuator(mut self, actuator: Actuator) -> Self {
        self.kind = PointKind::Actuator(actuator);
        self
    }

    pub fn actuator(&self) -> Option<&Actuator> {
        match &self.kind {
            PointKind::Actuator(actuator) => Some(actuator),
            _ => None,
        }
    }

    /// Whether the poll cycle reads this point
    pub fn is_polled(&self) -> bool {
        self.rule.is_polled()
    }

    /// Exclusive end of the register range, widened to avoid u16 overflow
    pub fn end_address(&self) -> u32 {
        u32::from(self.address) + u32::from(self.width)
    }

    /// Logical action -> register value mapping of a discrete actuator.
    ///
    /// Empty for non-actuators and for continuous actuators (time, number).
    pub fn writable_values(&self) -> Vec<(String, u16)> {
        match self.actuator() {
            Some(Actuator::Switch) => vec![("on".to_string(), 1), ("off".to_string(), 0)],
            Some(Actuator::Button { pressed_value }) => {
                vec![("press".to_string(), *pressed_value)]
            },
            Some(Actuator::Select { options }) => options
                .iter()
                .map(|o| (o.label.clone(), o.value))
                .collect(),
            Some(Actuator::Time | Actuator::Number { .. }) | None => Vec::new(),
        }
    }
}

/// Point as written in configuration; unit id, width and kind may be omitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointDefinition {
    pub key: String,
    #[serde(default)]
    pub unit_id: Option<u8>,
    pub address: u16,
    #[serde(default)]
    pub width: Option<u16>,
    pub rule: DecodeRule,
    #[serde(default)]
    pub actuator: Option<Actuator>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl PointDefinition {
    /// Resolve defaults against the engine's unit id.
    pub fn into_point(self, default_unit_id: u8) -> Point {
        let mut point = Point::new(
            self.key,
            self.unit_id.unwrap_or(default_unit_id),
            self.address,
            self.rule,
        );
        if let Some(width) = self.width {
            point.width = width;
        }
        if let Some(actuator) = self.actuator {
            point.kind = PointKind::Actuator(actuator);
        }
        point.unit = self.unit;
        point
    }
}
