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
use std::sync::{Arc, Mutex};

use crate::loader::DecodedBuffer;

use super::{OutputError, Source};

/// A recorded gain change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainEvent {
    pub gain: f32,
    pub ramp_sec: f64,
    /// The clock reading when the change was requested.
    pub at_sec: f64,
}

/// A recorded pitch-ratio change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchEvent {
    pub ratio: f64,
    pub ramp_sec: f64,
    pub at_sec: f64,
}

struct SourceInner {
    track_index: usize,
    buffer: Arc<DecodedBuffer>,
    started: Option<(f64, f64)>,
    stopped: bool,
    rates: Vec<(f64, Option<f64>)>,
    on_ended: Option<Box<dyn FnOnce() + Send>>,
}

/// A mock playback source; the test harness drives completion explicitly.
#[derive(Clone)]
pub struct MockSource {
    inner: Arc<Mutex<SourceInner>>,
}

impl MockSource {
    /// The track index this source was created for.
    pub fn track_index(&self) -> usize {
        self.inner.lock().expect("Error getting lock").track_index
    }

    /// The scheduled (start-at, input-offset) pair, if started.
    pub fn started(&self) -> Option<(f64, f64)> {
        self.inner.lock().expect("Error getting lock").started
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().expect("Error getting lock").stopped
    }

    pub fn buffer_duration_sec(&self) -> f64 {
        self.inner
            .lock()
            .expect("Error getting lock")
            .buffer
            .duration_sec()
    }

    /// Every rate set on this source, in order, with optional ramp-until
    /// clock times.
    pub fn rates(&self) -> Vec<(f64, Option<f64>)> {
        self.inner.lock().expect("Error getting lock").rates.clone()
    }

    /// Simulates the source playing to its end, firing the registered
    /// completion callback. Does nothing for stopped or unstarted sources.
    pub fn finish(&self) {
        let callback = {
            let mut inner = self.inner.lock().expect("Error getting lock");
            if inner.stopped || inner.started.is_none() {
                return;
            }
            inner.stopped = true;
            inner.on_ended.take()
        };
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl Source for MockSource {
    fn start(&mut self, at_sec: f64, offset_sec: f64) {
        let mut inner = self.inner.lock().expect("Error getting lock");
        inner.started = Some((at_sec, offset_sec));
    }

    fn stop(&mut self) {
        let callback = {
            let mut inner = self.inner.lock().expect("Error getting lock");
            if inner.stopped {
                return;
            }
            inner.stopped = true;
            inner.on_ended.take()
        };
        // Real backends fire the ended callback on explicit stops too; the
        // engine's run identifier is what filters those out.
        if let Some(callback) = callback {
            callback();
        }
    }

    fn set_rate(&mut self, rate: f64, ramp_until_sec: Option<f64>) {
        let mut inner = self.inner.lock().expect("Error getting lock");
        inner.rates.push((rate, ramp_until_sec));
    }

    fn set_on_ended(&mut self, callback: Box<dyn FnOnce() + Send>) {
        let mut inner = self.inner.lock().expect("Error getting lock");
        inner.on_ended = Some(callback);
    }
}

struct Inner {
    now_sec: f64,
    prepared_tracks: Option<usize>,
    running: bool,
    fail_prepare: Option<OutputError>,
    master_gains: Vec<GainEvent>,
    track_gains: Vec<(usize, GainEvent)>,
    pitch_ratios: Vec<PitchEvent>,
    sources: Vec<MockSource>,
}

/// A mock output capability. Doesn't render anything; records every call
/// and exposes a manually advanced clock so tests can drive the engine's
/// time-base arithmetic deterministically.
#[derive(Clone)]
pub struct Output {
    inner: Arc<Mutex<Inner>>,
}

impl Default for Output {
    fn default() -> Self {
        Output::new()
    }
}

impl Output {
    pub fn new() -> Output {
        Output {
            inner: Arc::new(Mutex::new(Inner {
                now_sec: 0.0,
                prepared_tracks: None,
                running: false,
                fail_prepare: None,
                master_gains: Vec::new(),
                track_gains: Vec::new(),
                pitch_ratios: Vec::new(),
                sources: Vec::new(),
            })),
        }
    }

    /// Advances the mock clock.
    pub fn advance(&self, sec: f64) {
        self.inner.lock().expect("Error getting lock").now_sec += sec;
    }

    /// Sets the mock clock to an absolute reading.
    pub fn set_now(&self, sec: f64) {
        self.inner.lock().expect("Error getting lock").now_sec = sec;
    }

    /// Makes the next prepare call fail with the given error.
    pub fn fail_next_prepare(&self, error: OutputError) {
        self.inner.lock().expect("Error getting lock").fail_prepare = Some(error);
    }

    pub fn prepared_tracks(&self) -> Option<usize> {
        self.inner.lock().expect("Error getting lock").prepared_tracks
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().expect("Error getting lock").running
    }

    pub fn master_gains(&self) -> Vec<GainEvent> {
        self.inner
            .lock()
            .expect("Error getting lock")
            .master_gains
            .clone()
    }

    pub fn last_master_gain(&self) -> Option<GainEvent> {
        self.master_gains().last().copied()
    }

    /// Gain events recorded for the given track, in order.
    pub fn track_gains(&self, track_index: usize) -> Vec<GainEvent> {
        self.inner
            .lock()
            .expect("Error getting lock")
            .track_gains
            .iter()
            .filter(|(track, _)| *track == track_index)
            .map(|(_, event)| *event)
            .collect()
    }

    pub fn last_track_gain(&self, track_index: usize) -> Option<GainEvent> {
        self.track_gains(track_index).last().copied()
    }

    pub fn pitch_ratios(&self) -> Vec<PitchEvent> {
        self.inner
            .lock()
            .expect("Error getting lock")
            .pitch_ratios
            .clone()
    }

    /// Every source ever created, including stopped ones.
    pub fn sources(&self) -> Vec<MockSource> {
        self.inner.lock().expect("Error getting lock").sources.clone()
    }

    /// Sources that are started and not yet stopped.
    pub fn active_sources(&self) -> Vec<MockSource> {
        self.sources()
            .into_iter()
            .filter(|source| source.started().is_some() && !source.is_stopped())
            .collect()
    }

    /// Finishes every active source, as if playback ran to the end.
    pub fn finish_all_active(&self) {
        for source in self.active_sources() {
            source.finish();
        }
    }
}

impl super::Output for Output {
    fn prepare(&mut self, track_count: usize) -> Result<(), OutputError> {
        let mut inner = self.inner.lock().expect("Error getting lock");
        if let Some(error) = inner.fail_prepare.take() {
            return Err(error);
        }
        inner.prepared_tracks = Some(track_count);
        Ok(())
    }

    fn ensure_running(&mut self) -> Result<(), OutputError> {
        self.inner.lock().expect("Error getting lock").running = true;
        Ok(())
    }

    fn create_source(&mut self, track_index: usize, buffer: Arc<DecodedBuffer>) -> Box<dyn Source> {
        let source = MockSource {
            inner: Arc::new(Mutex::new(SourceInner {
                track_index,
                buffer,
                started: None,
                stopped: false,
                rates: Vec::new(),
                on_ended: None,
            })),
        };
        self.inner
            .lock()
            .expect("Error getting lock")
            .sources
            .push(source.clone());
        Box::new(source)
    }

    fn set_track_gain(&mut self, track_index: usize, gain: f32, ramp_sec: f64) {
        let mut inner = self.inner.lock().expect("Error getting lock");
        let at_sec = inner.now_sec;
        inner.track_gains.push((
            track_index,
            GainEvent {
                gain,
                ramp_sec,
                at_sec,
            },
        ));
    }

    fn set_master_gain(&mut self, gain: f32, ramp_sec: f64) {
        let mut inner = self.inner.lock().expect("Error getting lock");
        let at_sec = inner.now_sec;
        inner.master_gains.push(GainEvent {
            gain,
            ramp_sec,
            at_sec,
        });
    }

    fn set_pitch_ratio(&mut self, ratio: f64, ramp_sec: f64) {
        let mut inner = self.inner.lock().expect("Error getting lock");
        let at_sec = inner.now_sec;
        inner.pitch_ratios.push(PitchEvent {
            ratio,
            ramp_sec,
            at_sec,
        });
    }

    fn now(&self) -> f64 {
        self.inner.lock().expect("Error getting lock").now_sec
    }
}
