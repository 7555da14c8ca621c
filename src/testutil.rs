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
use crate::analysis::BeatPoint;
use crate::loader::DecodedBuffer;

/// Synthesizes a mono click track: short alternating-sign bursts at the
/// given times over silence.
pub fn click_track(times: &[f64], sample_rate: u32, total_sec: f64) -> DecodedBuffer {
    let mut samples = vec![0.0f32; (total_sec * sample_rate as f64) as usize];
    for &time in times {
        let start = (time * sample_rate as f64) as usize;
        for i in 0..32usize {
            let Some(sample) = samples.get_mut(start + i) else {
                break;
            };
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            *sample = sign * 0.9 * (1.0 - i as f32 / 32.0);
        }
    }
    DecodedBuffer::new(vec![samples], sample_rate).expect("valid click buffer")
}

/// A silent buffer of the given duration, for tracks whose content does not
/// matter to the test.
pub fn silence(sample_rate: u32, total_sec: f64) -> DecodedBuffer {
    let samples = vec![0.0f32; (total_sec * sample_rate as f64) as usize];
    DecodedBuffer::new(vec![samples], sample_rate).expect("valid silent buffer")
}

/// Evenly spaced beats with flat confidence, starting at 0.
pub fn flat_beats(count: usize, spacing_sec: f64) -> Vec<BeatPoint> {
    (0..count)
        .map(|i| BeatPoint {
            time_sec: i as f64 * spacing_sec,
            strength: 1.0,
            brightness: 1.0,
        })
        .collect()
}
