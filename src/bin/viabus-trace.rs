// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! viabus-trace entry point
//!
//! Runs a TOML scenario against a fresh machine and prints the recorded
//! event trace, or checks it against a reference trace in JSON.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use viabus::core::config::{Config, TraceFormat};
use viabus::core::machine::Machine;
use viabus::core::trace::{self, Scenario};

#[derive(Parser, Debug)]
#[command(name = "viabus-trace", version, about = "Run VIA/IEC scenarios and record event traces")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario and print its trace
    Run {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Output format (defaults to the configured one)
        #[arg(short, long, value_enum)]
        format: Option<Format>,

        /// Write the trace to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a scenario and compare its trace with a reference
    Check {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Reference trace (JSON)
        #[arg(short, long)]
        expect: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Text,
    Json,
}

impl From<Format> for TraceFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => TraceFormat::Text,
            Format::Json => TraceFormat::Json,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(config.level_filter()?)
        .init();

    match cli.command {
        Command::Run {
            scenario,
            format,
            output,
        } => {
            let scenario = Scenario::load(&scenario)?;
            let mut machine = Machine::new(&config.machine);
            let events = scenario.run(&mut machine)?;
            log::info!("Scenario '{}' recorded {} events", scenario.name, events.len());

            let mut out: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };

            match format.map(TraceFormat::from).unwrap_or(config.trace.format) {
                TraceFormat::Text => trace::write_text(&events, &mut out)?,
                TraceFormat::Json => writeln!(out, "{}", trace::to_json(&events)?)?,
            }
            out.flush()?;
        }
        Command::Check { scenario, expect } => {
            let scenario = Scenario::load(&scenario)?;
            let expected = trace::load_json(&expect)?;
            let mut machine = Machine::new(&config.machine);
            let actual = scenario.run(&mut machine)?;

            if let Err(e) = trace::compare(&expected, &actual) {
                log::warn!("Trace differs from {}", expect.display());
                eprintln!("{}: {}", scenario.name, e);
                std::process::exit(1);
            }
            println!("{}: {} events match", scenario.name, actual.len());
        }
    }

    Ok(())
}
