//  Copyright 2025 rezex authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! One concrete example of the "thin callable facade" spec.md defers to
//! external collaborators: ad-hoc `compile`/`match`/`replace`/`metrics`
//! subcommands against the same public `rezex` API any host runtime
//! binding would call. Every invocation is a full `init`..`shutdown`
//! cycle - this binary is a debugging/ops tool, not a long-lived
//! server, so there is no reason to keep the process-wide singleton
//! alive past one command.

use bytesize::ByteSize;
use clap::{Parser, Subcommand};
use rezex::{CacheConfig, PatternOptions};
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("pattern must not be empty")]
    EmptyPattern,
}

#[derive(Parser)]
#[command(name = "rezex", about = "ad-hoc compile/match/replace/metrics against the rezex pattern cache")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Soft capacity for the pattern cache, in bytes.
    #[arg(long, global = true, default_value_t = 64 << 20)]
    capacity_bytes: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a pattern and report its capture-group layout.
    Compile {
        pattern: String,
        #[arg(long)]
        case_insensitive: bool,
    },
    /// Full- or partial-match a pattern against one input.
    Match {
        pattern: String,
        input: String,
        /// Partial (search-anywhere) match instead of full match.
        #[arg(long)]
        partial: bool,
    },
    /// Replace matches of a pattern in one input.
    Replace {
        pattern: String,
        input: String,
        rewrite: String,
        /// Replace only the first match instead of all matches.
        #[arg(long)]
        first_only: bool,
    },
    /// Print the metrics snapshot document as JSON.
    Metrics,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CacheConfig {
        pattern_cache_target_capacity_bytes: cli.capacity_bytes,
        ..CacheConfig::default()
    };
    rezex::init(config)?;
    let result = run(cli.command);
    rezex::shutdown()?;
    result
}

fn run(command: Command) -> anyhow::Result<()> {
    match &command {
        Command::Compile { pattern, .. } | Command::Match { pattern, .. } | Command::Replace { pattern, .. } => {
            if pattern.is_empty() {
                return Err(CliError::EmptyPattern.into());
            }
        }
        Command::Metrics => {}
    }

    match command {
        Command::Compile { pattern, case_insensitive } => {
            let mut options = PatternOptions::default();
            options.case_sensitive = !case_insensitive;
            let id = rezex::compile(pattern.as_bytes(), options)?;
            let info = rezex::introspect(id)?;
            println!("group_count: {}", info.group_count);
            for (index, name) in &info.group_names {
                println!("  {index}: {name}");
            }
            println!("approx_bytes: {}", ByteSize(info.approx_bytes));
            rezex::release(id)?;
        }
        Command::Match { pattern, input, partial } => {
            let id = rezex::compile(pattern.as_bytes(), PatternOptions::default())?;
            let matched = if partial {
                rezex::partial_match(id, input.as_str())?
            } else {
                rezex::full_match(id, input.as_str())?
            };
            rezex::release(id)?;
            println!("{matched}");
            if !matched {
                std::process::exit(1);
            }
        }
        Command::Replace { pattern, input, rewrite, first_only } => {
            let id = rezex::compile(pattern.as_bytes(), PatternOptions::default())?;
            if first_only {
                let result = rezex::replace_first(id, input.as_str(), rewrite.as_bytes())?;
                rezex::release(id)?;
                println!("{}", String::from_utf8_lossy(&result.output));
                eprintln!("replaced: {}", result.replaced);
            } else {
                let result = rezex::replace_all(id, input.as_str(), rewrite.as_bytes())?;
                rezex::release(id)?;
                println!("{}", String::from_utf8_lossy(&result.output));
                eprintln!("count: {}", result.count);
            }
        }
        Command::Metrics => {
            let snapshot = rezex::metrics_snapshot()?;
            println!("{}", snapshot.to_json()?);
        }
    }
    Ok(())
}
