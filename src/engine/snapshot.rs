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
use super::{Engine, State};

/// A derived, read-only snapshot of the engine for the presentation layer.
/// Commands are fire-and-forget; callers re-read this afterward.
#[derive(Clone, Debug)]
pub struct EngineStateView {
    pub initialized: bool,
    pub loading: bool,
    pub playing: bool,
    pub bpm: u32,
    pub current_input_sec: f64,
    pub duration_sec: f64,
    pub current_bar_number: u32,
    pub selected_start_bar_number: u32,
    pub selected_start_sec: f64,
    pub max_bar_number: u32,
    pub selectable_bar_numbers: Vec<u32>,
    pub tracks: Vec<TrackView>,
}

/// Per-track slice of the snapshot.
#[derive(Clone, Debug)]
pub struct TrackView {
    pub id: String,
    pub label: String,
    pub mute: bool,
    pub solo: bool,
    pub volume: f32,
    pub effective_gain: f32,
}

impl Engine {
    /// Builds the presentation snapshot, first draining any pending backend
    /// notifications so completed runs are reflected.
    pub fn snapshot(&mut self) -> EngineStateView {
        self.drain_events();

        let position = self.current_input_sec();
        let (current_bar, selected_bar, selected_sec, max_bar) = if self.bar_table.is_empty() {
            (0, 0, 0.0, 0)
        } else {
            (
                self.bar_table.display_bar(self.bar_table.bar_at(position)),
                self.bar_table.display_bar(self.selected_bar_index),
                self.bar_table.start_sec(self.selected_bar_index),
                self.bar_table.display_bar(self.bar_table.len() - 1),
            )
        };

        let gains = self.mix.effective_gains();
        let tracks = self
            .tracks
            .iter()
            .enumerate()
            .map(|(index, track)| {
                let state = self.mix.state(index);
                TrackView {
                    id: track.id().to_string(),
                    label: track.label().to_string(),
                    mute: state.mute(),
                    solo: state.solo(),
                    volume: state.volume(),
                    effective_gain: gains[index],
                }
            })
            .collect();

        EngineStateView {
            initialized: matches!(self.state, State::Ready | State::Playing | State::Paused),
            loading: self.state == State::Initializing,
            playing: self.state == State::Playing,
            bpm: self.bpm,
            current_input_sec: position,
            duration_sec: self.duration_sec,
            current_bar_number: current_bar,
            selected_start_bar_number: selected_bar,
            selected_start_sec: selected_sec,
            max_bar_number: max_bar,
            selectable_bar_numbers: self.bar_table.display_bars().to_vec(),
            tracks,
        }
    }
}
