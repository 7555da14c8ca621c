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
use crate::loader::LoadError;

/// Typed errors surfaced by the engine so callers can distinguish a fatal
/// missing-output condition from a retriable initialization failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No audio output capability is present. Fatal, there is no retry path.
    #[error("no audio output capability is available")]
    Unsupported,

    /// Output graph setup or a track load failed. The engine has rolled back
    /// to Uninitialized and init may be retried.
    #[error("initialization failed: {0}")]
    Initialization(#[from] InitFailure),
}

/// The reason an initialization attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum InitFailure {
    #[error("no tracks configured")]
    NoTracks,

    #[error("output graph setup failed: {0}")]
    Graph(String),

    #[error("track {track}: {source}")]
    Load {
        track: String,
        #[source]
        source: LoadError,
    },
}
