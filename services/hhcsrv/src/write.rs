//! Write path for actuator points
//!
//! Each operation validates the request against the point's actuator, writes the
//! register payload under the shared connection lock, then updates the cache
//! optimistically and notifies subscribers. Failed writes are logged, reported to the
//! caller and never retried.

use chrono::NaiveTime;
use errors::{HeatError, HeatResult};
use tracing::{error, info};

use crate::codec::{decode, encode_scaled, encode_time_of_day, DecodeRule, DecodedValue};
use crate::engine::{PollEngine, WriteFunction};
use crate::point::{Actuator, Point};
use crate::subscriber::UpdateEvent;

impl PollEngine {
    /// Write a button's pressed value
    pub async fn press(&self, key: &str) -> HeatResult<()> {
        let point = self.writable_point(key)?;
        let Some(Actuator::Button { pressed_value }) = point.actuator() else {
            return Err(HeatError::NotWritable(key.to_string()));
        };
        // Buttons have no readable state
        self.write_point(point, &[*pressed_value], None).await
    }

    /// Write 1 for on, 0 for off
    pub async fn set_switch(&self, key: &str, on: bool) -> HeatResult<()> {
        let point = self.writable_point(key)?;
        if !matches!(point.actuator(), Some(Actuator::Switch)) {
            return Err(HeatError::NotWritable(key.to_string()));
        }
        let raw = u16::from(on);
        self.write_point(point, &[raw], Some(decode(&point.rule, &[raw])))
            .await
    }

    /// Write the register value configured for `option`
    pub async fn select_option(&self, key: &str, option: &str) -> HeatResult<()> {
        let point = self.writable_point(key)?;
        let Some(Actuator::Select { options }) = point.actuator() else {
            return Err(HeatError::NotWritable(key.to_string()));
        };
        let Some(selected) = options.iter().find(|o| o.label == option) else {
            return Err(HeatError::InvalidOption {
                key: key.to_string(),
                option: option.to_string(),
            });
        };
        let optimistic = DecodedValue::Text(selected.label.clone());
        self.write_point(point, &[selected.value], Some(optimistic))
            .await
    }

    /// Write hour and minute packed into one register; seconds are dropped
    pub async fn set_time(&self, key: &str, time: NaiveTime) -> HeatResult<()> {
        let point = self.writable_point(key)?;
        if !matches!(point.actuator(), Some(Actuator::Time)) {
            return Err(HeatError::NotWritable(key.to_string()));
        }
        let raw = encode_time_of_day(time);
        self.write_point(point, &[raw], Some(decode(&point.rule, &[raw])))
            .await
    }

    /// Write a scaled value within the point's configured range
    pub async fn set_number(&self, key: &str, value: f64) -> HeatResult<()> {
        let point = self.writable_point(key)?;
        let (Some(Actuator::Number { min, max, .. }), DecodeRule::Scaled { factor }) =
            (point.actuator(), &point.rule)
        else {
            return Err(HeatError::NotWritable(key.to_string()));
        };
        if !value.is_finite() || value < *min || value > *max {
            return Err(HeatError::InvalidValue {
                key: key.to_string(),
                reason: format!("{value} outside {min}..={max}"),
            });
        }
        let raw = encode_scaled(value, *factor).ok_or_else(|| HeatError::InvalidValue {
            key: key.to_string(),
            reason: format!("{value} does not fit a 16-bit register"),
        })?;
        self.write_point(point, &[raw], Some(decode(&point.rule, &[raw])))
            .await
    }

    fn writable_point(&self, key: &str) -> HeatResult<&Point> {
        self.inner
            .registry
            .get(key)
            .ok_or_else(|| HeatError::PointNotFound(key.to_string()))
    }

    async fn write_point(
        &self,
        point: &Point,
        values: &[u16],
        optimistic: Option<DecodedValue>,
    ) -> HeatResult<()> {
        let connection = &self.inner.connection;
        let result = match (self.inner.options.write_function, values) {
            (WriteFunction::Single, [value]) => {
                connection
                    .write_register(point.unit_id, point.address, *value)
                    .await
            },
            _ => {
                connection
                    .write_registers(point.unit_id, point.address, values)
                    .await
            },
        };

        if let Err(e) = result {
            error!(
                "Write of {:?} to {} failed [{}]: {}",
                values,
                point.key,
                e.error_code(),
                e
            );
            return Err(e);
        }

        info!("Wrote {:?} to {}", values, point.key);
        if let Some(value) = optimistic {
            self.inner.cache.replace(&point.key, value);
        }
        self.inner.subscribers.notify(&UpdateEvent::Write {
            key: point.key.clone(),
        });
        Ok(())
    }
}
