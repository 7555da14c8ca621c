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
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{info, span, warn, Level, Span};

use crate::analysis::{detect_beats, BarAligner, BarStartTable};
use crate::audio::{Output, OutputError, Source};
use crate::error::{EngineError, InitFailure};
use crate::loader::{DecodedBuffer, Loader};
use crate::mix::MixBus;
use crate::pattern::{Pattern, TrackDefinition};
use crate::tempo::TempoRange;

mod snapshot;
#[cfg(test)]
mod tests;

pub use snapshot::{EngineStateView, TrackView};

/// Sources are scheduled slightly in the future so every track starts on
/// the same output-clock sample.
const SCHEDULE_LOOKAHEAD_SEC: f64 = 0.004;
/// Master fade-in applied on every start.
const FADE_IN_SEC: f64 = 0.08;
/// Master fade-out applied before pausing or seeking.
const FADE_OUT_SEC: f64 = 0.05;
/// Tempo changes ramp the stretch parameter and source rates over this.
const TEMPO_RAMP_SEC: f64 = 0.08;
/// Near-silence target for fades; exact zero defeats exponential ramps.
const SILENT_GAIN: f32 = 1e-4;
const NOMINAL_GAIN: f32 = 1.0;

/// The engine lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Initializing,
    Ready,
    Playing,
    Paused,
    Disposed,
}

/// Notifications delivered from the output backend. Tagged with the run
/// identifier so events from superseded runs are discarded.
enum EngineEvent {
    SourceEnded { run: u64, track: usize },
}

/// The playback scheduler: keeps the per-track sources time-locked, applies
/// tempo changes and bar seeks without audible discontinuities, and drives
/// the mix bus. All mutating commands are designed for a single serial
/// caller; the engine holds no internal locks.
pub struct Engine {
    output: Box<dyn Output>,
    loader: Box<dyn Loader>,
    tracks: Vec<TrackDefinition>,
    pattern: Pattern,
    tempo_range: TempoRange,
    mix: MixBus,
    /// Index of the track analyzed for bar boundaries.
    click_index: usize,

    state: State,
    bpm: u32,
    buffers: Vec<Arc<DecodedBuffer>>,
    bar_table: BarStartTable,
    duration_sec: f64,

    /// Monotonically increasing tag for the current playback run. Any
    /// stop/pause/seek/restart increments it first, so stale completion
    /// callbacks detect the mismatch and no-op.
    run_id: u64,
    sources: Vec<Box<dyn Source>>,
    /// Per-track completion flags for the current run.
    ended: Vec<bool>,

    /// Output clock at the last start.
    start_context_sec: f64,
    /// Input-seconds position at the last start.
    start_input_offset_sec: f64,
    /// Resume point while not playing.
    paused_input_offset_sec: f64,
    selected_bar_index: usize,
    /// Whether the previous run played every track to completion.
    run_completed: bool,

    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    span: Span,
}

impl Engine {
    /// Creates an engine around the injected loader and output capability.
    /// No resources are acquired until `init`.
    pub fn new(
        tracks: Vec<TrackDefinition>,
        pattern: Pattern,
        tempo_range: TempoRange,
        loader: Box<dyn Loader>,
        output: Box<dyn Output>,
    ) -> Engine {
        let click_index = tracks
            .iter()
            .position(|track| track.is_click())
            .unwrap_or(0);
        let mix = MixBus::new(&tracks);
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        Engine {
            output,
            loader,
            tracks,
            pattern,
            tempo_range,
            mix,
            click_index,
            state: State::Uninitialized,
            bpm: tempo_range.base(),
            buffers: Vec::new(),
            bar_table: BarStartTable::empty(),
            duration_sec: 0.0,
            run_id: 0,
            sources: Vec::new(),
            ended: Vec::new(),
            start_context_sec: 0.0,
            start_input_offset_sec: 0.0,
            paused_input_offset_sec: 0.0,
            selected_bar_index: 0,
            run_completed: false,
            events_tx,
            events_rx,
            span: span!(Level::INFO, "engine"),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// The current playback-rate factor; always bpm / base exactly.
    pub fn tempo_ratio(&self) -> f64 {
        self.tempo_range.ratio(self.bpm)
    }

    pub fn bar_table(&self) -> &BarStartTable {
        &self.bar_table
    }

    /// Allocates the output graph, loads every track and builds the bar
    /// table. Idempotent while in progress or done. Any failure releases
    /// partial resources and rolls back to Uninitialized; init may simply
    /// be retried.
    pub fn init(&mut self) -> Result<(), EngineError> {
        let span = self.span.clone();
        let _enter = span.enter();
        match self.state {
            State::Uninitialized => {}
            State::Disposed => {
                warn!("Ignoring init on a disposed engine.");
                return Ok(());
            }
            _ => return Ok(()),
        }

        self.state = State::Initializing;
        info!(tracks = self.tracks.len(), "Initializing engine.");
        if let Err(e) = self.try_init() {
            warn!(err = e.to_string(), "Initialization failed, rolling back.");
            self.buffers.clear();
            self.bar_table = BarStartTable::empty();
            self.duration_sec = 0.0;
            self.state = State::Uninitialized;
            return Err(e);
        }

        self.state = State::Ready;
        info!(
            bars = self.bar_table.len(),
            duration_sec = self.duration_sec,
            "Engine ready."
        );
        Ok(())
    }

    fn try_init(&mut self) -> Result<(), EngineError> {
        if self.tracks.is_empty() {
            return Err(EngineError::Initialization(InitFailure::NoTracks));
        }
        self.output
            .prepare(self.tracks.len())
            .map_err(map_output_error)?;

        let mut buffers = Vec::with_capacity(self.tracks.len());
        for track in &self.tracks {
            let buffer = self.loader.load(track.locator()).map_err(|source| {
                EngineError::Initialization(InitFailure::Load {
                    track: track.id().to_string(),
                    source,
                })
            })?;
            buffers.push(Arc::new(buffer));
        }

        self.duration_sec = buffers
            .iter()
            .map(|buffer| buffer.duration_sec())
            .fold(0.0, f64::max);

        let click = &buffers[self.click_index];
        let detection = detect_beats(click, self.pattern.bar_count());
        let aligner = BarAligner::new(
            &self.pattern,
            click.duration_sec(),
            self.tempo_range.base() as f64,
        );
        self.bar_table = aligner.align(&detection);
        self.buffers = buffers;

        self.mix.apply(self.output.as_mut());
        self.output.set_master_gain(NOMINAL_GAIN, 0.0);
        self.output.set_pitch_ratio(1.0 / self.tempo_ratio(), 0.0);
        Ok(())
    }

    /// Starts playback from the resume point: the paused offset, or the
    /// selected bar's start when the previous run played to completion.
    /// Auto-initializes from Uninitialized; a no-op while already playing
    /// or initializing.
    pub fn play(&mut self) -> Result<(), EngineError> {
        self.drain_events();
        let span = self.span.clone();
        let _enter = span.enter();
        match self.state {
            State::Playing | State::Initializing | State::Disposed => return Ok(()),
            State::Uninitialized => self.init()?,
            State::Ready | State::Paused => {}
        }

        let offset = if self.run_completed {
            self.bar_table.start_sec(self.selected_bar_index)
        } else {
            self.paused_input_offset_sec
        };

        // Nothing left to play at this offset: reset silently to bar 0
        // instead of starting.
        if offset >= self.duration_sec {
            info!(offset_sec = offset, "No remaining audio, resetting to bar 0.");
            self.paused_input_offset_sec = 0.0;
            self.selected_bar_index = 0;
            self.run_completed = false;
            self.state = State::Ready;
            return Ok(());
        }

        self.output.ensure_running().map_err(map_output_error)?;
        self.start_run(offset);
        Ok(())
    }

    /// Schedules one source per track with remaining audio at a common
    /// near-future start time, all advancing at the current tempo ratio.
    fn start_run(&mut self, offset_sec: f64) {
        self.run_id += 1;
        self.stop_sources();

        let ratio = self.tempo_ratio();
        let start_at = self.output.now() + SCHEDULE_LOOKAHEAD_SEC;
        self.ended = vec![false; self.tracks.len()];

        for (track, buffer) in self.buffers.iter().enumerate() {
            if buffer.duration_sec() <= offset_sec {
                // Already past this track's end; it never joins the run.
                self.ended[track] = true;
                continue;
            }
            let mut source = self.output.create_source(track, Arc::clone(buffer));
            source.set_rate(ratio, None);
            let events = self.events_tx.clone();
            let run = self.run_id;
            source.set_on_ended(Box::new(move || {
                let _ = events.send(EngineEvent::SourceEnded { run, track });
            }));
            source.start(start_at, offset_sec);
            self.sources.push(source);
        }

        self.output.set_pitch_ratio(1.0 / ratio, 0.0);
        self.output.set_master_gain(SILENT_GAIN, 0.0);
        self.output.set_master_gain(NOMINAL_GAIN, FADE_IN_SEC);

        self.start_context_sec = start_at;
        self.start_input_offset_sec = offset_sec;
        self.run_completed = false;
        self.state = State::Playing;
        info!(
            run = self.run_id,
            offset_sec = offset_sec,
            bpm = self.bpm,
            "Playback started."
        );
    }

    /// Captures the current mapped input position, fades out and stops the
    /// sources, and stores the position as the resume point.
    pub fn pause(&mut self) {
        self.drain_events();
        let span = self.span.clone();
        let _enter = span.enter();
        if self.state != State::Playing {
            return;
        }

        let position = self.current_input_sec();
        self.run_id += 1;
        self.output.set_master_gain(SILENT_GAIN, FADE_OUT_SEC);
        self.stop_sources();
        self.paused_input_offset_sec = position;
        self.selected_bar_index = self.bar_table.bar_at(position);
        self.state = State::Paused;
        info!(position_sec = position, "Playback paused.");
    }

    /// Stops playback and resets the position and selected bar to bar 0.
    /// Valid from any state.
    pub fn stop(&mut self) {
        self.drain_events();
        let span = self.span.clone();
        let _enter = span.enter();
        if self.state == State::Disposed {
            return;
        }

        self.run_id += 1;
        self.stop_sources();
        self.paused_input_offset_sec = 0.0;
        self.selected_bar_index = 0;
        self.run_completed = false;
        match self.state {
            State::Ready | State::Playing | State::Paused => {
                self.output.set_master_gain(NOMINAL_GAIN, 0.0);
                self.state = State::Ready;
                info!("Playback stopped.");
            }
            _ => {}
        }
    }

    /// Sets the practice tempo, clamped to the range and quantized to the
    /// step grid.
    pub fn set_bpm(&mut self, bpm: i64) {
        self.drain_events();
        self.apply_bpm(self.tempo_range.quantize(bpm));
    }

    /// Adjusts the practice tempo by the given delta.
    pub fn change_bpm(&mut self, delta: i64) {
        self.drain_events();
        let target = self.bpm as i64 + delta;
        self.apply_bpm(self.tempo_range.quantize(target));
    }

    /// Restores the reference tempo.
    pub fn reset_bpm(&mut self) {
        self.drain_events();
        self.apply_bpm(self.tempo_range.base());
    }

    fn apply_bpm(&mut self, bpm: u32) {
        let span = self.span.clone();
        let _enter = span.enter();
        if bpm == self.bpm {
            return;
        }

        if self.state == State::Playing {
            // Re-anchor the start reference to the current position so the
            // music does not jump, then ramp rather than step.
            let position = self.current_input_sec();
            let now = self.output.now();
            self.bpm = bpm;
            let ratio = self.tempo_ratio();
            self.start_context_sec = now;
            self.start_input_offset_sec = position;

            let ramp_until = now + TEMPO_RAMP_SEC;
            self.output.set_pitch_ratio(1.0 / ratio, TEMPO_RAMP_SEC);
            for source in &mut self.sources {
                source.set_rate(ratio, Some(ramp_until));
            }
        } else {
            self.bpm = bpm;
        }
        info!(bpm = bpm, ratio = self.tempo_ratio(), "Tempo changed.");
    }

    /// Jumps the start point to the configured bar nearest the requested
    /// display number. While playing, fades out and restarts at the new
    /// offset; seeking always re-anchors rather than adjusting in place.
    pub fn set_start_bar(&mut self, display_bar: u32) {
        self.drain_events();
        let span = self.span.clone();
        let _enter = span.enter();
        if self.bar_table.is_empty() || self.state == State::Disposed {
            return;
        }

        let index = self.bar_table.nearest_display(display_bar);
        let offset = self.bar_table.start_sec(index);
        self.selected_bar_index = index;
        self.paused_input_offset_sec = offset;
        self.run_completed = false;
        info!(
            requested = display_bar,
            bar = self.bar_table.display_bar(index),
            offset_sec = offset,
            "Start bar selected."
        );

        if self.state == State::Playing {
            self.output.set_master_gain(SILENT_GAIN, FADE_OUT_SEC);
            // Bounded wait for the fade to land before tearing the run down.
            thread::sleep(Duration::from_secs_f64(FADE_OUT_SEC));
            self.start_run(offset);
        }
    }

    pub fn toggle_mute(&mut self, id: &str) {
        self.drain_events();
        if let Some(index) = self.mix.index_of(id) {
            self.mix.toggle_mute(index);
            self.apply_mix();
        }
    }

    pub fn toggle_solo(&mut self, id: &str) {
        self.drain_events();
        if let Some(index) = self.mix.index_of(id) {
            self.mix.toggle_solo(index);
            self.apply_mix();
        }
    }

    pub fn set_volume(&mut self, id: &str, volume: f32) {
        self.drain_events();
        if let Some(index) = self.mix.index_of(id) {
            self.mix.set_volume(index, volume);
            self.apply_mix();
        }
    }

    /// Releases all resources. Terminal.
    pub fn dispose(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.state == State::Disposed {
            return;
        }
        self.run_id += 1;
        self.stop_sources();
        self.buffers.clear();
        self.state = State::Disposed;
        info!("Engine disposed.");
    }

    /// The current position in input-track seconds: extrapolated from the
    /// output clock while playing, the stored resume point otherwise.
    pub fn current_input_sec(&self) -> f64 {
        let position = if self.state == State::Playing {
            self.start_input_offset_sec
                + (self.output.now() - self.start_context_sec) * self.tempo_ratio()
        } else {
            self.paused_input_offset_sec
        };
        position.clamp(0.0, self.duration_sec)
    }

    fn apply_mix(&mut self) {
        if matches!(self.state, State::Uninitialized | State::Disposed) {
            // Nothing prepared yet; gains are applied during init.
            return;
        }
        self.mix.apply(self.output.as_mut());
    }

    fn stop_sources(&mut self) {
        for source in &mut self.sources {
            source.stop();
        }
        self.sources.clear();
    }

    /// Drains pending backend notifications. Called at every entry point;
    /// events tagged with a superseded run identifier are discarded.
    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                EngineEvent::SourceEnded { run, track } => self.handle_source_ended(run, track),
            }
        }
    }

    fn handle_source_ended(&mut self, run: u64, track: usize) {
        let span = self.span.clone();
        let _enter = span.enter();
        if run != self.run_id || self.state != State::Playing {
            info!(run = run, track = track, "Ignoring stale completion.");
            return;
        }
        if let Some(flag) = self.ended.get_mut(track) {
            *flag = true;
        }
        if self.ended.iter().all(|ended| *ended) {
            self.finish_run();
        }
    }

    /// Every track in the run has ended: mirror stop(), but keep the
    /// selected start bar so the next play resumes from it.
    fn finish_run(&mut self) {
        self.stop_sources();
        self.paused_input_offset_sec = 0.0;
        self.run_completed = true;
        self.output.set_master_gain(NOMINAL_GAIN, 0.0);
        self.state = State::Ready;
        info!(run = self.run_id, "Run played to completion.");
    }
}

fn map_output_error(error: OutputError) -> EngineError {
    match error {
        OutputError::Unsupported => EngineError::Unsupported,
        OutputError::Graph(message) => {
            EngineError::Initialization(InitFailure::Graph(message))
        }
    }
}
