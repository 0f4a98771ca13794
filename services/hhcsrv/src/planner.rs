//! Read planning
//!
//! Coalesces polled points into holding-register range reads. Points are grouped per
//! unit, ordered by address, and merged while the gap between them stays within
//! `max_gap` and the whole range within `max_batch` registers. Overlapping points
//! (such as the two halves of the version block) share one range.

use std::collections::BTreeMap;

use crate::constants::MODBUS_MAX_READ_REGISTERS;
use crate::point::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Merge adjacent points into range reads; otherwise one read per point
    pub batch: bool,
    /// Largest range span in registers
    pub max_batch: u16,
    /// Largest tolerated hole between two merged points
    pub max_gap: u16,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            batch: true,
            max_batch: 32,
            max_gap: 0,
        }
    }
}

/// One holding-register range read and the points it feeds
#[derive(Debug, Clone, PartialEq)]
pub struct ReadBatch<'a> {
    pub unit_id: u8,
    pub start: u16,
    pub count: u16,
    pub points: Vec<&'a Point>,
}

impl<'a> ReadBatch<'a> {
    fn single(point: &'a Point) -> Self {
        Self {
            unit_id: point.unit_id,
            start: point.address,
            count: point.width,
            points: vec![point],
        }
    }

    fn end(&self) -> u32 {
        u32::from(self.start) + u32::from(self.count)
    }

    /// Register words of `point` within a response to this batch
    pub fn slice<'w>(&self, point: &Point, words: &'w [u16]) -> Option<&'w [u16]> {
        let offset = usize::from(point.address.checked_sub(self.start)?);
        words.get(offset..offset + usize::from(point.width))
    }
}

/// Plan the range reads for `points`.
pub fn plan_reads<'a>(
    points: impl IntoIterator<Item = &'a Point>,
    options: &PlanOptions,
) -> Vec<ReadBatch<'a>> {
    if !options.batch {
        return points.into_iter().map(ReadBatch::single).collect();
    }

    let max_span = u32::from(options.max_batch.clamp(1, MODBUS_MAX_READ_REGISTERS));
    let max_gap = u32::from(options.max_gap);

    let mut by_unit: BTreeMap<u8, Vec<&'a Point>> = BTreeMap::new();
    for point in points {
        by_unit.entry(point.unit_id).or_default().push(point);
    }

    let mut batches = Vec::new();
    for (_, mut unit_points) in by_unit {
        unit_points.sort_by_key(|p| (p.address, p.width));

        let mut current: Option<ReadBatch<'a>> = None;
        for point in unit_points {
            if let Some(batch) = current.as_mut() {
                let start = u32::from(batch.start);
                let new_end = batch.end().max(point.end_address());
                let fits = u32::from(point.address) <= batch.end() + max_gap
                    && new_end - start <= max_span;
                if fits {
                    batch.count = (new_end - start) as u16;
                    batch.points.push(point);
                    continue;
                }
            }
            if let Some(done) = current.replace(ReadBatch::single(point)) {
                batches.push(done);
            }
        }
        batches.extend(current);
    }
    batches
}
