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

use crate::audio::{mock, OutputError};
use crate::error::EngineError;
use crate::loader::MemoryLoader;
use crate::pattern::{Pattern, TrackDefinition};
use crate::tempo::TempoRange;
use crate::testutil::silence;

use super::{Engine, State};

const SAMPLE_RATE: u32 = 8000;

/// Builds an engine over three silent 12-second tracks and a 4-bar pattern.
/// Silence makes detection degenerate, so the bar table is the uniform grid
/// at the 80 bpm base: bars start at 0, 3, 6 and 9 seconds.
fn harness() -> (Engine, mock::Output) {
    let tracks = vec![
        TrackDefinition::new("click", "Click", "click", 0.5, true),
        TrackDefinition::new("drums", "Drums", "drums", 0.8, false),
        TrackDefinition::new("bass", "Bass", "bass", 1.0, false),
    ];
    let pattern = Pattern::new(vec![1, 2, 3, 4], vec![], HashMap::new()).unwrap();
    let mut loader = MemoryLoader::new();
    for locator in ["click", "drums", "bass"] {
        loader.insert(locator, silence(SAMPLE_RATE, 12.0));
    }
    let output = mock::Output::new();
    let engine = Engine::new(
        tracks,
        pattern,
        TempoRange::default(),
        Box::new(loader),
        Box::new(output.clone()),
    );
    (engine, output)
}

#[test]
fn test_init_builds_bar_table() {
    let (mut engine, output) = harness();
    engine.init().expect("init");

    assert_eq!(engine.state(), State::Ready);
    assert_eq!(output.prepared_tracks(), Some(3));

    let view = engine.snapshot();
    assert!(view.initialized);
    assert!(!view.playing);
    assert_eq!(view.bpm, 80);
    assert!((view.duration_sec - 12.0).abs() < 1e-9);
    assert_eq!(view.selectable_bar_numbers, vec![1, 2, 3, 4]);
    assert_eq!(view.max_bar_number, 4);
    assert_eq!(view.current_bar_number, 1);

    // Initial gains reflect the configured base volumes.
    assert_eq!(output.last_track_gain(0).unwrap().gain, 0.5);
    assert_eq!(output.last_track_gain(1).unwrap().gain, 0.8);
    assert_eq!(output.last_track_gain(2).unwrap().gain, 1.0);

    // Re-init is a no-op.
    engine.init().expect("repeat init");
    assert_eq!(engine.state(), State::Ready);
}

#[test]
fn test_init_with_no_tracks_fails() {
    let pattern = Pattern::new(vec![1], vec![], HashMap::new()).unwrap();
    let output = mock::Output::new();
    let mut engine = Engine::new(
        vec![],
        pattern,
        TempoRange::default(),
        Box::new(MemoryLoader::new()),
        Box::new(output.clone()),
    );

    let error = engine.init().expect_err("init should fail");
    assert!(matches!(error, EngineError::Initialization(_)));
    assert_eq!(engine.state(), State::Uninitialized);
    // The failure is caught before the output graph is touched.
    assert_eq!(output.prepared_tracks(), None);
}

#[test]
fn test_init_failure_rolls_back_and_retries() {
    let (mut engine, output) = harness();

    output.fail_next_prepare(OutputError::Graph("boom".to_string()));
    let error = engine.init().expect_err("init should fail");
    assert!(matches!(error, EngineError::Initialization(_)));
    assert_eq!(engine.state(), State::Uninitialized);
    assert!(!engine.snapshot().initialized);

    // A failed init never poisons the engine.
    engine.init().expect("retried init");
    assert_eq!(engine.state(), State::Ready);
}

#[test]
fn test_unsupported_environment_is_surfaced() {
    let (mut engine, output) = harness();
    output.fail_next_prepare(OutputError::Unsupported);
    assert!(matches!(
        engine.init().expect_err("init should fail"),
        EngineError::Unsupported
    ));
}

#[test]
fn test_play_auto_inits_and_schedules_all_tracks() {
    let (mut engine, output) = harness();
    engine.play().expect("play");

    assert_eq!(engine.state(), State::Playing);
    assert!(output.is_running());

    let sources = output.active_sources();
    assert_eq!(sources.len(), 3);
    for source in &sources {
        // Common near-future start, common offset, current tempo ratio.
        assert_eq!(source.started(), Some((0.004, 0.0)));
        assert_eq!(source.rates(), vec![(1.0, None)]);
    }

    // Fade-in from near silence on the master gain.
    let gains = output.master_gains();
    let fade = gains.last().unwrap();
    assert_eq!(fade.gain, 1.0);
    assert!(fade.ramp_sec > 0.0);
    assert!(gains[gains.len() - 2].gain < 1e-3);

    // Pitch compensation is the inverse of the tempo ratio.
    assert_eq!(output.pitch_ratios().last().unwrap().ratio, 1.0);

    // Another play is a no-op.
    engine.play().expect("repeat play");
    assert_eq!(output.active_sources().len(), 3);
}

#[test]
fn test_pause_right_after_play_stays_within_quantum() {
    let (mut engine, output) = harness();
    engine.init().expect("init");
    engine.set_start_bar(2);
    engine.play().expect("play");

    engine.pause();
    assert_eq!(engine.state(), State::Paused);
    assert!(output.active_sources().is_empty());

    // Bar 2 starts at 3.0s; the captured offset may lag by at most the
    // scheduling lookahead times the tempo ratio.
    let view = engine.snapshot();
    assert!(!view.playing);
    assert!((view.current_input_sec - 3.0).abs() <= 0.004 + 1e-9);
    // The selected bar is recomputed from the captured offset, which lands
    // a lookahead before bar 2's boundary.
    assert_eq!(view.selected_start_bar_number, 1);
}

#[test]
fn test_tempo_change_keeps_position() {
    let (mut engine, output) = harness();
    engine.play().expect("play");
    output.set_now(2.004);

    let before = engine.current_input_sec();
    assert!((before - 2.0).abs() < 1e-9);

    engine.set_bpm(90);
    assert_eq!(engine.bpm(), 90);
    assert_eq!(engine.tempo_ratio(), 90.0 / 80.0);
    let after = engine.current_input_sec();
    assert!((after - before).abs() < 1e-9);
    assert_eq!(engine.state(), State::Playing);

    // Rates ramp rather than step, on every active source.
    for source in output.active_sources() {
        let (rate, ramp_until) = *source.rates().last().unwrap();
        assert_eq!(rate, 90.0 / 80.0);
        assert!((ramp_until.unwrap() - (2.004 + 0.08)).abs() < 1e-9);
    }
    let pitch = *output.pitch_ratios().last().unwrap();
    assert!((pitch.ratio - 80.0 / 90.0).abs() < 1e-12);
    assert!(pitch.ramp_sec > 0.0);
}

#[test]
fn test_change_bpm_clamps_and_quantizes() {
    let (mut engine, _output) = harness();
    engine.init().expect("init");

    engine.change_bpm(2);
    assert_eq!(engine.bpm(), 82);

    engine.set_bpm(98);
    engine.change_bpm(100);
    assert_eq!(engine.bpm(), 100);
    assert_eq!(engine.tempo_ratio(), 1.25);

    engine.set_bpm(60);
    engine.change_bpm(-100);
    assert_eq!(engine.bpm(), 60);
    assert_eq!(engine.tempo_ratio(), 0.75);

    engine.reset_bpm();
    assert_eq!(engine.bpm(), 80);
    assert_eq!(engine.tempo_ratio(), 1.0);
}

#[test]
fn test_solo_and_mute_resolution() {
    let (mut engine, output) = harness();
    engine.init().expect("init");

    engine.toggle_solo("drums");
    assert_eq!(output.last_track_gain(0).unwrap().gain, 0.0);
    assert_eq!(output.last_track_gain(1).unwrap().gain, 0.8);
    assert_eq!(output.last_track_gain(2).unwrap().gain, 0.0);

    // Muting a soloed track silences it regardless of the solo flag.
    engine.toggle_mute("drums");
    assert_eq!(output.last_track_gain(1).unwrap().gain, 0.0);

    let view = engine.snapshot();
    assert!(view.tracks[1].mute);
    assert!(view.tracks[1].solo);
    assert_eq!(view.tracks[1].effective_gain, 0.0);

    // Unknown ids are ignored.
    engine.toggle_mute("vocals");
    engine.set_volume("vocals", 0.1);
}

#[test]
fn test_set_start_bar_clamps_to_range() {
    let (mut engine, _output) = harness();
    engine.init().expect("init");

    engine.set_start_bar(99);
    let view = engine.snapshot();
    assert_eq!(view.selected_start_bar_number, 4);
    assert!((view.selected_start_sec - 9.0).abs() < 1e-9);

    engine.set_start_bar(0);
    let view = engine.snapshot();
    assert_eq!(view.selected_start_bar_number, 1);
    assert_eq!(view.selected_start_sec, 0.0);
}

#[test]
fn test_seek_while_playing_restarts_at_new_offset() {
    let (mut engine, output) = harness();
    engine.play().expect("play");
    output.set_now(1.0);

    engine.set_start_bar(3);
    assert_eq!(engine.state(), State::Playing);

    let sources = output.active_sources();
    assert_eq!(sources.len(), 3);
    for source in &sources {
        let (at, offset) = source.started().unwrap();
        assert!((offset - 6.0).abs() < 1e-9);
        assert!((at - 1.004).abs() < 1e-9);
    }
    // Six sources were created in total; the first run's are stopped.
    assert_eq!(output.sources().len(), 6);

    // At the scheduled start time the position reads exactly the new offset.
    output.set_now(1.004);
    let view = engine.snapshot();
    assert!(view.playing);
    assert_eq!(view.current_bar_number, 3);
    assert!((view.current_input_sec - 6.0).abs() < 1e-9);
}

#[test]
fn test_stale_completions_from_superseded_run_are_ignored() {
    let (mut engine, output) = harness();
    engine.play().expect("play");

    // Pausing stops the sources, which (as in a real backend) fires their
    // ended callbacks tagged with the superseded run.
    engine.pause();
    assert_eq!(engine.state(), State::Paused);

    // Draining those events must not complete or restart anything.
    let view = engine.snapshot();
    assert!(!view.playing);
    assert_eq!(engine.state(), State::Paused);

    // A fresh run still completes normally afterward.
    engine.play().expect("play");
    output.finish_all_active();
    let view = engine.snapshot();
    assert!(!view.playing);
    assert!(view.initialized);
}

#[test]
fn test_completion_resets_position_but_keeps_selected_bar() {
    let (mut engine, output) = harness();
    engine.init().expect("init");
    engine.set_start_bar(3);
    engine.play().expect("play");

    output.finish_all_active();
    let view = engine.snapshot();
    assert!(!view.playing);
    assert_eq!(view.current_input_sec, 0.0);
    assert_eq!(view.selected_start_bar_number, 3);
    assert_eq!(engine.state(), State::Ready);

    // The next play resumes from the selected bar, not from 0.
    engine.play().expect("play");
    for source in output.active_sources() {
        assert!((source.started().unwrap().1 - 6.0).abs() < 1e-9);
    }
}

#[test]
fn test_play_with_no_remaining_audio_resets_silently() {
    let (mut engine, output) = harness();
    engine.play().expect("play");

    // Walk the clock past the end of every track, then pause: the captured
    // position clamps to the full duration.
    output.set_now(20.0);
    engine.pause();
    assert_eq!(engine.snapshot().current_input_sec, 12.0);

    let created = output.sources().len();
    engine.play().expect("play");
    assert_eq!(engine.state(), State::Ready);
    assert_eq!(output.sources().len(), created);
    assert_eq!(engine.snapshot().current_input_sec, 0.0);

    // And a following play starts from bar 0.
    engine.play().expect("play");
    assert_eq!(engine.state(), State::Playing);
    for source in output.active_sources() {
        assert_eq!(source.started().unwrap().1, 0.0);
    }
}

#[test]
fn test_stop_resets_everything() {
    let (mut engine, output) = harness();
    engine.init().expect("init");
    engine.set_start_bar(4);
    engine.play().expect("play");
    output.set_now(5.0);

    engine.stop();
    assert_eq!(engine.state(), State::Ready);
    assert!(output.active_sources().is_empty());

    let view = engine.snapshot();
    assert_eq!(view.current_input_sec, 0.0);
    assert_eq!(view.selected_start_bar_number, 1);
    assert_eq!(output.last_master_gain().unwrap().gain, 1.0);

    // Stop is valid from any state.
    engine.stop();
    assert_eq!(engine.state(), State::Ready);
}

#[test]
fn test_dispose_is_terminal() {
    let (mut engine, output) = harness();
    engine.play().expect("play");

    engine.dispose();
    assert_eq!(engine.state(), State::Disposed);
    assert!(output.active_sources().is_empty());

    engine.play().expect("play is ignored");
    assert_eq!(engine.state(), State::Disposed);
    engine.init().expect("init is ignored");
    assert_eq!(engine.state(), State::Disposed);
}

#[test]
fn test_current_bar_tracks_position() {
    let (mut engine, output) = harness();
    engine.play().expect("play");

    output.set_now(7.004);
    let view = engine.snapshot();
    assert!((view.current_input_sec - 7.0).abs() < 1e-9);
    assert_eq!(view.current_bar_number, 3);
}
