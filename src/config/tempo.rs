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

use serde::Deserialize;

/// A YAML representation of the practice tempo range.
#[derive(Deserialize)]
pub(super) struct Tempo {
    /// The reference bpm of the recorded tracks.
    base: u32,
    /// The lowest selectable bpm.
    min: u32,
    /// The highest selectable bpm.
    max: u32,
    /// The bpm step between selectable tempos.
    step: u32,
}

impl Tempo {
    /// Converts this tempo configuration into a validated tempo range.
    pub(super) fn to_tempo_range(&self) -> Result<crate::tempo::TempoRange, Box<dyn Error>> {
        crate::tempo::TempoRange::new(self.base, self.min, self.max, self.step)
    }
}
