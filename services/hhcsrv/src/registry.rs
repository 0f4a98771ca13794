//! Point registry
//!
//! Validated, immutable table of points. Construction is the only place a
//! configuration problem can surface; a registry that exists is consistent.

use std::collections::{HashMap, HashSet};

use errors::{HeatError, HeatResult};
use tracing::debug;

use crate::codec::DecodeRule;
use crate::point::{Actuator, Point, PointKind};

#[derive(Debug, Clone)]
pub struct PointRegistry {
    points: Vec<Point>,
    index: HashMap<String, usize>,
}

impl PointRegistry {
    /// Build a registry, refusing any inconsistent entry.
    pub fn new(points: Vec<Point>) -> HeatResult<Self> {
        let mut index = HashMap::with_capacity(points.len());
        for (i, point) in points.iter().enumerate() {
            validate_point(point)?;
            if index.insert(point.key.clone(), i).is_some() {
                return Err(HeatError::DuplicatePoint(point.key.clone()));
            }
        }
        debug!("Point registry built with {} points", points.len());
        Ok(Self { points, index })
    }

    pub fn get(&self, key: &str) -> Option<&Point> {
        self.index.get(key).map(|&i| &self.points[i])
    }

    /// Points in registry order
    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    /// Points the poll cycle reads, in registry order
    pub fn polled(&self) -> impl Iterator<Item = &Point> {
        self.points.iter().filter(|p| p.is_polled())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(|p| p.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> HeatError {
    HeatError::InvalidConfig {
        field: format!("points.{key}"),
        reason: reason.into(),
    }
}

fn validate_point(point: &Point) -> HeatResult<()> {
    let key = point.key.as_str();
    if key.trim().is_empty() {
        return Err(invalid("<empty>", "point key must not be empty"));
    }

    if !matches!(point.width, 1 | 3 | 4) || !point.rule.accepts_width(point.width) {
        return Err(HeatError::InvalidWidth {
            key: key.to_string(),
            width: point.width,
        });
    }
    if point.end_address() > u32::from(u16::MAX) + 1 {
        return Err(invalid(key, "register range exceeds the address space"));
    }

    if let DecodeRule::EnumStatus(table) = &point.rule {
        if table.is_empty() {
            return Err(invalid(key, "status table is empty"));
        }
    }
    if let DecodeRule::Scaled { factor } = point.rule {
        if factor == 0.0 || !factor.is_finite() {
            return Err(invalid(key, "scale factor must be finite and non-zero"));
        }
    }

    match &point.kind {
        PointKind::Actuator(actuator) => validate_actuator(key, &point.rule, actuator),
        _ if point.rule == DecodeRule::WriteOnly => {
            Err(invalid(key, "write-only points must be buttons"))
        },
        _ => Ok(()),
    }
}

fn validate_actuator(key: &str, rule: &DecodeRule, actuator: &Actuator) -> HeatResult<()> {
    match actuator {
        Actuator::Switch => Ok(()),
        Actuator::Button { .. } => Ok(()),
        Actuator::Select { options } => {
            if options.is_empty() {
                return Err(invalid(key, "select has no options"));
            }
            let mut seen = HashSet::new();
            for option in options {
                if !seen.insert(option.label.as_str()) {
                    return Err(invalid(
                        key,
                        format!("duplicate select option '{}'", option.label),
                    ));
                }
            }
            Ok(())
        },
        Actuator::Time => {
            if *rule != DecodeRule::TimeOfDay {
                return Err(invalid(key, "time actuator requires the time_of_day rule"));
            }
            Ok(())
        },
        Actuator::Number { min, max, step } => {
            if !matches!(rule, DecodeRule::Scaled { .. }) {
                return Err(invalid(key, "number actuator requires the scaled rule"));
            }
            if min > max {
                return Err(invalid(key, format!("min {min} is greater than max {max}")));
            }
            if *step <= 0.0 {
                return Err(invalid(key, "step must be positive"));
            }
            Ok(())
        },
    }
}
