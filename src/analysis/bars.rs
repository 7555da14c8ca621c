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
use tracing::debug;

use crate::analysis::onset::Detection;
use crate::analysis::BeatPoint;
use crate::pattern::Pattern;

/// Plausible beat-to-beat interval bounds for the median estimate.
const MIN_BEAT_INTERVAL_SEC: f64 = 0.2;
const MAX_BEAT_INTERVAL_SEC: f64 = 1.6;
/// Confidence blend weights for landing beats.
const STRENGTH_WEIGHT: f64 = 0.72;
const BRIGHTNESS_WEIGHT: f64 = 0.28;
/// Duration deviations are normalized by this fraction of the expected span.
const DURATION_TOLERANCE: f64 = 0.45;
/// Penalty for consuming a beat count different from the bar's configured one.
const METER_PENALTY: f64 = 1.4;
/// Terminal penalty weight on leftover beats deviating from 4.
const LEFTOVER_PENALTY: f64 = 0.2;
/// Bar starts closer than this are collapsed.
const MIN_BAR_GAP_SEC: f64 = 0.08;

/// Ordered, strictly increasing bar-start times in input-track seconds,
/// parallel-indexed to the pattern's display bar numbers. The first entry is
/// always exactly 0.
#[derive(Clone, Debug, Default)]
pub struct BarStartTable {
    starts: Vec<f64>,
    display_bars: Vec<u32>,
}

impl BarStartTable {
    fn new(starts: Vec<f64>, display_bars: &[u32]) -> BarStartTable {
        let display_bars = display_bars[..starts.len().min(display_bars.len())].to_vec();
        BarStartTable {
            starts,
            display_bars,
        }
    }

    pub fn empty() -> BarStartTable {
        BarStartTable::default()
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// The start time of the bar at the given index.
    pub fn start_sec(&self, index: usize) -> f64 {
        self.starts[index]
    }

    /// The user-facing bar number at the given index.
    pub fn display_bar(&self, index: usize) -> u32 {
        self.display_bars[index]
    }

    pub fn display_bars(&self) -> &[u32] {
        &self.display_bars
    }

    /// The greatest bar index whose start time is at or before the given
    /// position. Positions before the first bar resolve to bar 0.
    pub fn bar_at(&self, position_sec: f64) -> usize {
        self.starts
            .partition_point(|&start| start <= position_sec)
            .saturating_sub(1)
    }

    /// The index of the bar whose display number is nearest to the request,
    /// clamped to the table. Ties resolve to the earlier bar.
    pub fn nearest_display(&self, display_bar: u32) -> usize {
        let after = self
            .display_bars
            .partition_point(|&bar| bar < display_bar);
        if after == 0 {
            return 0;
        }
        if after == self.display_bars.len() {
            return self.display_bars.len() - 1;
        }
        let below = display_bar - self.display_bars[after - 1];
        let above = self.display_bars[after] - display_bar;
        if below <= above {
            after - 1
        } else {
            after
        }
    }
}

/// Aligns detected beats to the pattern's bars via a dynamic program over
/// (bar, beat) states, with a uniform-grid fallback for degenerate input.
pub struct BarAligner<'a> {
    pattern: &'a Pattern,
    duration_sec: f64,
    /// Beat duration source of last resort when no plausible intervals exist.
    fallback_bpm: f64,
}

impl<'a> BarAligner<'a> {
    pub fn new(pattern: &'a Pattern, duration_sec: f64, fallback_bpm: f64) -> BarAligner<'a> {
        BarAligner {
            pattern,
            duration_sec,
            fallback_bpm,
        }
    }

    /// Builds the bar-start table. Degenerate detections and unalignable
    /// beat lists silently fall back to the uniform grid.
    pub fn align(&self, detection: &Detection) -> BarStartTable {
        let starts = match detection {
            Detection::Beats(beats) => self.align_beats(beats).unwrap_or_else(|| {
                debug!("Beat alignment failed, using uniform grid.");
                self.uniform_grid(self.median_beat_sec(beats))
            }),
            Detection::Degenerate(beats) => self.uniform_grid(self.median_beat_sec(beats)),
        };
        BarStartTable::new(
            dedupe_starts(force_zero_start(starts)),
            self.pattern.display_bars(),
        )
    }

    /// Median of plausible beat-to-beat intervals, or the fallback beat
    /// duration when none exist.
    fn median_beat_sec(&self, beats: &[BeatPoint]) -> f64 {
        let mut intervals: Vec<f64> = beats
            .windows(2)
            .map(|pair| pair[1].time_sec - pair[0].time_sec)
            .filter(|interval| {
                (MIN_BEAT_INTERVAL_SEC..=MAX_BEAT_INTERVAL_SEC).contains(interval)
            })
            .collect();
        if intervals.is_empty() {
            return 60.0 / self.fallback_bpm;
        }
        intervals.sort_by(|a, b| a.partial_cmp(b).expect("intervals are finite"));
        intervals[intervals.len() / 2]
    }

    /// Expected duration of the given bar when it consumes `count` beats:
    /// from the bar's tempo hint when present, else the median beat.
    fn expected_span_sec(&self, bar: usize, count: u32, median_beat_sec: f64) -> f64 {
        let beat_sec = match self.pattern.tempo_hint(bar) {
            Some(bpm) => 60.0 / bpm,
            None => median_beat_sec,
        };
        count as f64 * beat_sec
    }

    /// The dynamic program. Returns one start time per configured bar, or
    /// None when the beat list cannot produce the full bar count.
    fn align_beats(&self, beats: &[BeatPoint]) -> Option<Vec<f64>> {
        let num_bars = self.pattern.bar_count();
        let num_beats = beats.len();
        if num_beats == 0 {
            return None;
        }

        let median = self.median_beat_sec(beats);
        let confidence = landing_confidence(beats);

        // score[bar][beat]: best score with `bar` starting at `beat`.
        let mut score = vec![vec![f64::NEG_INFINITY; num_beats]; num_bars];
        let mut back = vec![vec![usize::MAX; num_beats]; num_bars];
        score[0][0] = 0.0;

        for bar in 0..num_bars.saturating_sub(1) {
            let configured = self.pattern.beats_in(bar);
            let counts = if configured == 2 { [2u32, 4] } else { [4u32, 2] };
            for beat in 0..num_beats {
                if score[bar][beat] == f64::NEG_INFINITY {
                    continue;
                }
                for count in counts {
                    let landing = beat + count as usize;
                    if landing >= num_beats {
                        continue;
                    }
                    let span = beats[landing].time_sec - beats[beat].time_sec;
                    let expected = self.expected_span_sec(bar, count, median);
                    let fit = -((span - expected).abs() / (DURATION_TOLERANCE * expected));
                    let meter = if count == configured {
                        0.0
                    } else {
                        -METER_PENALTY
                    };
                    let candidate = score[bar][beat] + confidence[landing] + fit + meter;
                    if candidate > score[bar + 1][landing] {
                        score[bar + 1][landing] = candidate;
                        back[bar + 1][landing] = beat;
                    }
                }
            }
        }

        // Terminal choice: prefer endings whose leftover beats are close to
        // one final four-beat bar.
        let last = num_bars - 1;
        let mut best: Option<(usize, f64)> = None;
        for beat in 0..num_beats {
            if score[last][beat] == f64::NEG_INFINITY {
                continue;
            }
            let leftover = (num_beats - 1 - beat) as f64;
            let total = score[last][beat] - LEFTOVER_PENALTY * (leftover - 4.0).abs();
            if best.is_none_or(|(_, best_total)| total > best_total) {
                best = Some((beat, total));
            }
        }

        let (mut beat, _) = best?;
        let mut starts = vec![0.0; num_bars];
        for bar in (0..num_bars).rev() {
            starts[bar] = beats[beat].time_sec;
            if bar > 0 {
                beat = back[bar][beat];
                if beat == usize::MAX {
                    return None;
                }
            }
        }
        Some(starts)
    }

    /// Accumulates expected per-bar durations from 0 until the bar count or
    /// the track duration is exhausted.
    fn uniform_grid(&self, median_beat_sec: f64) -> Vec<f64> {
        let mut starts = Vec::with_capacity(self.pattern.bar_count());
        let mut cursor = 0.0f64;
        for bar in 0..self.pattern.bar_count() {
            if bar > 0 && cursor >= self.duration_sec {
                break;
            }
            starts.push(cursor);
            let count = self.pattern.beats_in(bar);
            cursor += self.expected_span_sec(bar, count, median_beat_sec);
        }
        starts
    }
}

/// Normalized blend of onset strength and brightness per beat.
fn landing_confidence(beats: &[BeatPoint]) -> Vec<f64> {
    let max_strength = beats
        .iter()
        .map(|beat| beat.strength)
        .fold(0.0f32, f32::max)
        .max(1e-6);
    let max_brightness = beats
        .iter()
        .map(|beat| beat.brightness)
        .fold(0.0f32, f32::max)
        .max(1e-6);
    beats
        .iter()
        .map(|beat| {
            STRENGTH_WEIGHT * (beat.strength / max_strength) as f64
                + BRIGHTNESS_WEIGHT * (beat.brightness / max_brightness) as f64
        })
        .collect()
}

/// Forces the first start to exactly 0.
fn force_zero_start(mut starts: Vec<f64>) -> Vec<f64> {
    if let Some(first) = starts.first_mut() {
        *first = 0.0;
    }
    starts
}

/// Drops starts closer than the minimum bar gap to their predecessor.
fn dedupe_starts(starts: Vec<f64>) -> Vec<f64> {
    let mut deduped: Vec<f64> = Vec::with_capacity(starts.len());
    for start in starts {
        match deduped.last() {
            Some(&last) if start - last < MIN_BAR_GAP_SEC => {}
            _ => deduped.push(start),
        }
    }
    deduped
}
