// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;

/// The practice tempo control range. Requested bpm values are clamped to
/// [min, max] and snapped to the step grid anchored at min, so every
/// reachable bpm is min plus a whole number of steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TempoRange {
    /// The reference bpm of the recorded tracks; tempoRatio == bpm / base.
    base: u32,
    min: u32,
    max: u32,
    step: u32,
}

impl Default for TempoRange {
    fn default() -> Self {
        TempoRange {
            base: 80,
            min: 60,
            max: 100,
            step: 2,
        }
    }
}

impl TempoRange {
    /// Creates a tempo range. Base and max must lie on the step grid
    /// anchored at min, otherwise quantization could leave the grid.
    pub fn new(base: u32, min: u32, max: u32, step: u32) -> Result<TempoRange, Box<dyn Error>> {
        if step == 0 {
            return Err("tempo step must be positive".into());
        }
        if min > max {
            return Err("tempo min must not exceed max".into());
        }
        if base < min || base > max {
            return Err("base bpm must lie within [min, max]".into());
        }
        if (base - min) % step != 0 || (max - min) % step != 0 {
            return Err("base and max bpm must lie on the step grid".into());
        }
        Ok(TempoRange {
            base,
            min,
            max,
            step,
        })
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Clamps the requested bpm to [min, max] and snaps it to the nearest
    /// grid point.
    pub fn quantize(&self, bpm: i64) -> u32 {
        let clamped = bpm.clamp(self.min as i64, self.max as i64) as u32;
        let steps = (clamped - self.min + self.step / 2) / self.step;
        (self.min + steps * self.step).min(self.max)
    }

    /// The playback-rate factor for the given bpm.
    pub fn ratio(&self, bpm: u32) -> f64 {
        bpm as f64 / self.base as f64
    }
}
