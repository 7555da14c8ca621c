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
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{crate_version, Parser, Subcommand};

use bartrack::analysis::{detect_beats, BarAligner};
use bartrack::config;
use bartrack::loader::{Loader, WavFileLoader};
use bartrack::util::minutes_seconds_millis;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A synchronized multitrack practice player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyzes the click track of a session and prints the bar-start table.
    Bars {
        /// The path to the session file.
        session_path: String,
    },
    /// Verifies a session file, loading every track.
    Verify {
        /// The path to the session file.
        session_path: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Bars { session_path } => {
            let path = PathBuf::from(&session_path);
            let session = config::parse_session(&path)?;
            let loader = WavFileLoader::new(base_dir(&path));

            let tracks = session.tracks();
            let click = tracks
                .iter()
                .find(|track| track.is_click())
                .unwrap_or(&tracks[0]);
            let buffer = loader.load(click.locator())?;

            let detection = detect_beats(&buffer, session.pattern().bar_count());
            let table = BarAligner::new(
                session.pattern(),
                buffer.duration_sec(),
                session.tempo_range().base() as f64,
            )
            .align(&detection);

            println!(
                "Bars (count: {}, from track '{}'):",
                table.len(),
                click.id()
            );
            for index in 0..table.len() {
                println!(
                    "- bar {} at {}",
                    table.display_bar(index),
                    minutes_seconds_millis(table.start_sec(index))
                );
            }
        }
        Commands::Verify { session_path } => {
            let path = PathBuf::from(&session_path);
            let session = config::parse_session(&path)?;
            let loader = WavFileLoader::new(base_dir(&path));

            println!("Tracks (count: {}):", session.tracks().len());
            for track in session.tracks() {
                let buffer = loader.load(track.locator())?;
                println!(
                    "- {} ({}){}",
                    track.label(),
                    minutes_seconds_millis(buffer.duration_sec()),
                    if track.is_click() { " [click]" } else { "" }
                );
            }

            let tempo = session.tempo_range();
            println!(
                "Pattern: {} bars. Tempo: {} bpm in [{}, {}] step {}.",
                session.pattern().bar_count(),
                tempo.base(),
                tempo.min(),
                tempo.max(),
                tempo.step()
            );
        }
    }

    Ok(())
}

/// Resolves track locators relative to the session file's directory.
fn base_dir(session_path: &Path) -> PathBuf {
    session_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
