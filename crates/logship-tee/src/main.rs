// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod job;

use std::env;
use std::io;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logship::{JobRun, Shipper, ShipperConfig};

use crate::job::FileJobRun;

const EXIT_BROKEN: u8 = 1;
const EXIT_CONFIG: u8 = 2;

/// What the binary does with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Tee stdin to stdout, shipping every line.
    Stream,
    /// Ship the tail of `LOGSHIP_LOG_FILE` once.
    Tail,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "" | "stream" => Ok(Self::Stream),
            "tail" => Ok(Self::Tail),
            other => Err(format!("unknown LOGSHIP_MODE '{other}'")),
        }
    }
}

fn main() -> ExitCode {
    let log_level = env::var("LOGSHIP_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,lapin=warn,{log_level}");

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    debug!("Logging subsystem enabled");

    let config = match ShipperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("LOGSHIP | Invalid configuration: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let mode = match env::var("LOGSHIP_MODE").unwrap_or_default().parse::<Mode>() {
        Ok(mode) => mode,
        Err(e) => {
            error!("LOGSHIP | {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let shipper = Shipper::new(config);
    let run: Arc<dyn JobRun> = Arc::new(FileJobRun::from_env());

    let broken = match mode {
        Mode::Stream => stream(&shipper, run),
        Mode::Tail => tail(&shipper, run),
    };

    match broken {
        Ok(true) => {
            error!("LOGSHIP | Shipping ended broken, failing as configured");
            ExitCode::from(EXIT_BROKEN)
        }
        Ok(false) => ExitCode::SUCCESS,
        Err(e) => {
            error!("LOGSHIP | Unable to forward output: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Tees stdin to stdout. Returns whether the job should fail.
fn stream(shipper: &Shipper, run: Arc<dyn JobRun>) -> io::Result<bool> {
    info!(
        "LOGSHIP | Streaming to {} indexer",
        shipper.config().indexer.kind()
    );
    let mut tap = shipper.tap(io::stdout(), run, Box::new(io::stdout()));
    io::copy(&mut io::stdin().lock(), &mut tap)?;
    tap.close()?;

    Ok(tap
        .writer_mut()
        .is_some_and(|writer| shipper.fails_job(writer)))
}

/// Ships the log tail once. Returns whether the job should fail.
fn tail(shipper: &Shipper, run: Arc<dyn JobRun>) -> io::Result<bool> {
    if !shipper.config().enabled {
        info!("LOGSHIP | Shipping disabled, nothing to do");
        return Ok(false);
    }

    let max_lines = shipper.config().max_lines;
    let mut writer = shipper.writer(run, Box::new(io::stdout()));
    writer.write_build_log(max_lines);
    writer.close();
    Ok(shipper.fails_job(&mut writer))
}
