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
use std::collections::{HashMap, HashSet};
use std::error::Error;

/// An immutable description of one audio track in a practice session.
#[derive(Clone, Debug)]
pub struct TrackDefinition {
    /// The stable identifier used by the mixing commands.
    id: String,
    /// The user-facing label.
    label: String,
    /// The locator handed to the loader, e.g. a relative file path.
    locator: String,
    /// The configured volume in [0, 1], applied under the user volume.
    initial_volume: f32,
    /// Whether this track is the metronome click used for bar analysis.
    click: bool,
}

impl TrackDefinition {
    /// Creates a new track definition. The initial volume is clamped to [0, 1].
    pub fn new(id: &str, label: &str, locator: &str, initial_volume: f32, click: bool) -> Self {
        TrackDefinition {
            id: id.to_string(),
            label: label.to_string(),
            locator: locator.to_string(),
            initial_volume: initial_volume.clamp(0.0, 1.0),
            click,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn initial_volume(&self) -> f32 {
        self.initial_volume
    }

    pub fn is_click(&self) -> bool {
        self.click
    }
}

/// The musical bar layout of a piece: the user-facing bar numbers (which may
/// skip values), which bars span two beats instead of the usual four, and
/// optional per-bar tempo hints.
#[derive(Clone, Debug)]
pub struct Pattern {
    /// Strictly increasing display bar numbers.
    display_bars: Vec<u32>,
    /// The subset of display bars that span two beats.
    two_beat_bars: HashSet<u32>,
    /// Optional bpm override per display bar.
    tempo_hints: HashMap<u32, f64>,
}

impl Pattern {
    /// Creates a pattern, validating that the display bars are strictly
    /// increasing and that the two-beat bars and tempo hints only reference
    /// configured bars.
    pub fn new(
        display_bars: Vec<u32>,
        two_beat_bars: Vec<u32>,
        tempo_hints: HashMap<u32, f64>,
    ) -> Result<Pattern, Box<dyn Error>> {
        if display_bars.is_empty() {
            return Err("pattern must contain at least one bar".into());
        }
        if display_bars.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("display bars must be strictly increasing".into());
        }

        let known: HashSet<u32> = display_bars.iter().copied().collect();
        for bar in &two_beat_bars {
            if !known.contains(bar) {
                return Err(format!("two-beat bar {} is not a configured bar", bar).into());
            }
        }
        for (bar, bpm) in &tempo_hints {
            if !known.contains(bar) {
                return Err(format!("tempo hint references unknown bar {}", bar).into());
            }
            if *bpm <= 0.0 {
                return Err(format!("tempo hint for bar {} must be positive", bar).into());
            }
        }

        Ok(Pattern {
            display_bars,
            two_beat_bars: two_beat_bars.into_iter().collect(),
            tempo_hints,
        })
    }

    /// The configured target bar count.
    pub fn bar_count(&self) -> usize {
        self.display_bars.len()
    }

    /// The user-facing bar numbers, strictly increasing.
    pub fn display_bars(&self) -> &[u32] {
        &self.display_bars
    }

    /// The number of beats in the bar at the given index: 4 unless the bar
    /// is configured as a two-beat bar.
    pub fn beats_in(&self, index: usize) -> u32 {
        if self.two_beat_bars.contains(&self.display_bars[index]) {
            2
        } else {
            4
        }
    }

    /// The bpm hint for the bar at the given index, if one is configured.
    pub fn tempo_hint(&self, index: usize) -> Option<f64> {
        self.tempo_hints.get(&self.display_bars[index]).copied()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::Pattern;

    #[test]
    fn test_pattern_validation() {
        assert!(Pattern::new(vec![], vec![], HashMap::new()).is_err());
        assert!(Pattern::new(vec![1, 2, 2], vec![], HashMap::new()).is_err());
        assert!(Pattern::new(vec![3, 2], vec![], HashMap::new()).is_err());
        assert!(Pattern::new(vec![1, 2, 3], vec![7], HashMap::new()).is_err());
        assert!(Pattern::new(vec![1, 2, 3], vec![], HashMap::from([(9, 80.0)])).is_err());
        assert!(Pattern::new(vec![1, 2, 3], vec![], HashMap::from([(2, 0.0)])).is_err());
        assert!(Pattern::new(vec![1, 2, 3], vec![2], HashMap::from([(2, 80.0)])).is_ok());
    }

    #[test]
    fn test_beats_and_hints() {
        let pattern = Pattern::new(
            vec![70, 71, 72, 74],
            vec![72],
            HashMap::from([(72, 60.0)]),
        )
        .unwrap();

        assert_eq!(pattern.bar_count(), 4);
        assert_eq!(pattern.beats_in(0), 4);
        assert_eq!(pattern.beats_in(2), 2);
        assert_eq!(pattern.tempo_hint(2), Some(60.0));
        assert_eq!(pattern.tempo_hint(3), None);
    }
}
