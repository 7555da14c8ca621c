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
use std::sync::Arc;

use crate::loader::DecodedBuffer;

pub mod mock;

/// Errors from the output capability.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The environment has no audio output at all. Fatal.
    #[error("no audio output capability is available")]
    Unsupported,

    /// Graph allocation or context startup failed. Retriable.
    #[error("output graph error: {0}")]
    Graph(String),
}

/// A per-track playback source scheduled against the output clock. Created
/// fresh for every playback run and discarded on stop.
pub trait Source: Send {
    /// Schedules playback to begin at the given output-clock time, reading
    /// from the given input-seconds offset within the source buffer.
    fn start(&mut self, at_sec: f64, offset_sec: f64);

    /// Stops playback immediately. Idempotent.
    fn stop(&mut self);

    /// Sets the playback rate, optionally ramping until the given
    /// output-clock time instead of stepping.
    fn set_rate(&mut self, rate: f64, ramp_until_sec: Option<f64>);

    /// Registers a callback fired once when the source stops producing
    /// audio, either by playing to completion or by an explicit stop.
    fn set_on_ended(&mut self, callback: Box<dyn FnOnce() + Send>);
}

/// The injected audio-output capability: node creation, scheduled starts,
/// ramped parameter sets and a monotonic clock. The engine performs all of
/// its time-base arithmetic against this clock; the actual sample rendering
/// happens behind this trait on a real-time path the engine never touches.
pub trait Output: Send {
    /// Allocates the per-track gain stages, the shared stretch/pitch node
    /// and the master gain stage.
    fn prepare(&mut self, track_count: usize) -> Result<(), OutputError>;

    /// Makes sure the output context is running; called before scheduling
    /// sources, since contexts may start suspended.
    fn ensure_running(&mut self) -> Result<(), OutputError>;

    /// Creates a playback source for the given track's buffer.
    fn create_source(&mut self, track_index: usize, buffer: Arc<DecodedBuffer>) -> Box<dyn Source>;

    /// Ramps the given track's gain stage over `ramp_sec` (0 steps).
    fn set_track_gain(&mut self, track_index: usize, gain: f32, ramp_sec: f64);

    /// Ramps the master gain stage over `ramp_sec` (0 steps).
    fn set_master_gain(&mut self, gain: f32, ramp_sec: f64);

    /// Ramps the stretch node's pitch-compensation ratio. The node's tempo
    /// parameter stays fixed at 1; this ratio undoes the pitch shift
    /// introduced by per-source playback-rate changes.
    fn set_pitch_ratio(&mut self, ratio: f64, ramp_sec: f64);

    /// The monotonic output clock, in seconds.
    fn now(&self) -> f64;
}
