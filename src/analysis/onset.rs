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

use crate::analysis::BeatPoint;
use crate::loader::DecodedBuffer;

/// Envelope hop size in samples.
const HOP: usize = 256;
/// One-pole smoothing coefficient for the amplitude envelope.
const SMOOTHING: f32 = 0.28;
/// Minimum temporal gap between surviving peaks.
const MIN_PEAK_GAP_SEC: f64 = 0.22;
/// Half-width of the brightness window around a peak.
const BRIGHTNESS_HALF_WINDOW_SEC: f64 = 0.015;
/// Threshold interpolation between the 90th and 99th onset percentiles.
const THRESHOLD_BLEND: f32 = 0.24;

/// The outcome of onset detection over a click track.
#[derive(Debug)]
pub enum Detection {
    /// Enough beats were found to attempt bar alignment.
    Beats(Vec<BeatPoint>),
    /// Too few beats for alignment; callers are expected to fall back to a
    /// uniform bar grid. Not a failure.
    Degenerate(Vec<BeatPoint>),
}

impl Detection {
    pub fn beats(&self) -> &[BeatPoint] {
        match self {
            Detection::Beats(beats) | Detection::Degenerate(beats) => beats,
        }
    }
}

/// Detects candidate beat onsets in the decoded click track. The returned
/// list is strictly increasing in time and always starts at exactly 0.
pub fn detect_beats(buffer: &DecodedBuffer, target_bar_count: usize) -> Detection {
    let mono = buffer.to_mono();
    let sample_rate = buffer.sample_rate() as f64;

    let envelope = smoothed_envelope(&mono);
    let onsets = onset_curve(&envelope);
    let threshold = adaptive_threshold(&onsets);
    let mut beats = pick_peaks(&onsets, threshold, &mono, sample_rate);
    force_zero_beat(&mut beats);

    let required = 24usize.max(2 * target_bar_count);
    debug!(
        beats = beats.len(),
        required = required,
        threshold = threshold,
        "Onset detection complete."
    );
    if beats.len() < required {
        Detection::Degenerate(beats)
    } else {
        Detection::Beats(beats)
    }
}

/// Rectified short-window amplitude envelope with one-pole exponential
/// smoothing, one value per hop.
fn smoothed_envelope(mono: &[f32]) -> Vec<f32> {
    let mut envelope = Vec::with_capacity(mono.len() / HOP + 1);
    let mut smoothed = 0.0f32;
    for (i, window) in mono.chunks(HOP).enumerate() {
        let mean = window.iter().map(|sample| sample.abs()).sum::<f32>() / window.len() as f32;
        smoothed = if i == 0 {
            mean
        } else {
            SMOOTHING * mean + (1.0 - SMOOTHING) * smoothed
        };
        envelope.push(smoothed);
    }
    envelope
}

/// Half-wave rectified first difference of the envelope.
fn onset_curve(envelope: &[f32]) -> Vec<f32> {
    let mut onsets = vec![0.0f32; envelope.len()];
    for i in 1..envelope.len() {
        onsets[i] = (envelope[i] - envelope[i - 1]).max(0.0);
    }
    onsets
}

/// Adaptive threshold derived from the 90th and 99th percentiles of the
/// onset curve.
fn adaptive_threshold(onsets: &[f32]) -> f32 {
    if onsets.is_empty() {
        return 0.0;
    }
    let mut sorted = onsets.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("onset values are finite"));
    let p90 = percentile(&sorted, 0.90);
    let p99 = percentile(&sorted, 0.99);
    p90 + THRESHOLD_BLEND * (p99 - p90)
}

fn percentile(sorted: &[f32], fraction: f64) -> f32 {
    let index = ((sorted.len() - 1) as f64 * fraction).round() as usize;
    sorted[index]
}

/// Selects local maxima above the threshold, enforcing the minimum peak gap
/// by keeping the stronger of two close peaks.
fn pick_peaks(onsets: &[f32], threshold: f32, mono: &[f32], sample_rate: f64) -> Vec<BeatPoint> {
    let hop_sec = HOP as f64 / sample_rate;
    let mut peaks: Vec<BeatPoint> = Vec::new();

    for i in 1..onsets.len() {
        let value = onsets[i];
        if value <= threshold || value < onsets[i - 1] {
            continue;
        }
        if i + 1 < onsets.len() && value < onsets[i + 1] {
            continue;
        }

        let point = BeatPoint {
            time_sec: i as f64 * hop_sec,
            strength: value,
            brightness: brightness_at(mono, i * HOP, sample_rate),
        };
        match peaks.last_mut() {
            Some(last) if point.time_sec - last.time_sec < MIN_PEAK_GAP_SEC => {
                if point.strength > last.strength {
                    *last = point;
                }
            }
            _ => peaks.push(point),
        }
    }

    peaks
}

/// Ratio of sample-to-sample variation to absolute amplitude in a small
/// window around the peak. Click transients alternate quickly and score
/// higher than sustained tones of the same level.
fn brightness_at(mono: &[f32], center: usize, sample_rate: f64) -> f32 {
    let half = (BRIGHTNESS_HALF_WINDOW_SEC * sample_rate) as usize;
    let lo = center.saturating_sub(half);
    let hi = (center + half).min(mono.len());
    if hi <= lo + 1 {
        return 0.0;
    }

    let mut variation = 0.0f32;
    let mut amplitude = 0.0f32;
    for i in lo + 1..hi {
        variation += (mono[i] - mono[i - 1]).abs();
        amplitude += mono[i].abs();
    }
    variation / (amplitude + 1e-6)
}

/// Forces a beat at exactly time 0, clamping the first beat when it is
/// already close or inserting a synthetic one otherwise.
fn force_zero_beat(beats: &mut Vec<BeatPoint>) {
    match beats.first_mut() {
        Some(first) if first.time_sec < MIN_PEAK_GAP_SEC => first.time_sec = 0.0,
        _ => {
            let strength = if beats.is_empty() {
                0.0
            } else {
                beats.iter().map(|beat| beat.strength).sum::<f32>() / beats.len() as f32
            };
            beats.insert(
                0,
                BeatPoint {
                    time_sec: 0.0,
                    strength,
                    brightness: 0.0,
                },
            );
        }
    }
}
