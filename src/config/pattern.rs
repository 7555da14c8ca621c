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
use std::collections::HashMap;
use std::error::Error;

use serde::Deserialize;

/// A YAML representation of the bar pattern.
#[derive(Deserialize)]
pub(super) struct Pattern {
    /// The user-facing bar numbers, strictly increasing.
    bars: Vec<u32>,
    /// The subset of bars that span two beats instead of four.
    two_beat_bars: Option<Vec<u32>>,
    /// Optional bpm override per bar.
    tempo_hints: Option<HashMap<u32, f64>>,
}

impl Pattern {
    /// Converts this pattern configuration into a validated pattern.
    pub(super) fn to_pattern(&self) -> Result<crate::pattern::Pattern, Box<dyn Error>> {
        crate::pattern::Pattern::new(
            self.bars.clone(),
            self.two_beat_bars.clone().unwrap_or_default(),
            self.tempo_hints.clone().unwrap_or_default(),
        )
    }
}
