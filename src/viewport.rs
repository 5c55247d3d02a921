//! Windowing math for the virtualized table.
//!
//! Only rows intersecting the viewport (plus a small overscan) are rendered;
//! each is placed at `index * row_height` inside a spacer sized to the full
//! list, so the scrollbar behaves as if every row existed.

use serde::Serialize;
use std::ops::Range;

pub const DEFAULT_ROW_HEIGHT: u32 = 48;
pub const DEFAULT_OVERSCAN: usize = 1;

#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
pub struct VirtualRow {
    pub index: usize,
    pub start: u64,
}

#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub height: u32,
    pub scroll_offset: u64,
    pub row_height: u32,
    pub overscan: usize,
}

impl Viewport {
    pub fn new(height: u32) -> Self {
        Viewport {
            height,
            scroll_offset: 0,
            row_height: DEFAULT_ROW_HEIGHT,
            overscan: DEFAULT_OVERSCAN,
        }
    }

    pub fn with_row_height(mut self, row_height: u32) -> Self {
        self.row_height = row_height.max(1);
        self
    }

    pub fn total_size(&self, count: usize) -> u64 {
        (count as u64).saturating_mul(u64::from(self.row_height))
    }

    pub fn max_offset(&self, count: usize) -> u64 {
        self.total_size(count).saturating_sub(u64::from(self.height))
    }

    /// Moves to `offset`, clamped so the viewport never runs past the list.
    pub fn scroll_to(&mut self, offset: u64, count: usize) {
        self.scroll_offset = offset.min(self.max_offset(count));
    }

    pub fn scroll_to_row(&mut self, index: usize, count: usize) {
        self.scroll_to((index as u64).saturating_mul(u64::from(self.row_height)), count);
    }

    pub fn scroll_by_rows(&mut self, delta: i64, count: usize) {
        let step = delta.unsigned_abs() * u64::from(self.row_height);
        let target = if delta < 0 {
            self.scroll_offset.saturating_sub(step)
        } else {
            self.scroll_offset.saturating_add(step)
        };
        self.scroll_to(target, count);
    }

    pub fn resize(&mut self, height: u32, count: usize) {
        self.height = height;
        self.scroll_to(self.scroll_offset, count);
    }

    /// Index range to render for a list of `count` rows.
    ///
    /// Starts at the row under the top edge, ends after the row under the
    /// bottom edge, then extends by `overscan` rows. The length never exceeds
    /// `ceil(height / row_height) + 1 + overscan`.
    pub fn visible_range(&self, count: usize) -> Range<usize> {
        let rh = u64::from(self.row_height);
        let first = (self.scroll_offset / rh) as usize;
        let bottom = self.scroll_offset + u64::from(self.height);
        let past_last = bottom.div_ceil(rh) as usize;

        let start = first.min(count);
        let end = past_last.saturating_add(self.overscan).min(count).max(start);
        start..end
    }

    pub fn virtual_rows(&self, count: usize) -> Vec<VirtualRow> {
        let rh = u64::from(self.row_height);
        self.visible_range(count)
            .map(|index| VirtualRow {
                index,
                start: index as u64 * rh,
            })
            .collect()
    }
}
