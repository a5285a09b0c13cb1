//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;
mod report;
mod runner;

use clap::{App, Arg};
use config::{Config, LoggingFileRotation, LoggingFmtStyle};
use gosim_mpls::scenario::Scenario;
use report::Report;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stderr, keeping stdout for the report.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let default_directive = "gosim=debug"
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::DEBUG.into());
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_directive)
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

fn signal_listener() -> mpsc::Receiver<()> {
    let (signal_tx, signal_rx) = mpsc::channel(1);

    tokio::task::spawn(async move {
        let (Ok(mut sigint), Ok(mut sigterm)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) else {
            error!("failed to install signal handlers");
            return;
        };

        tokio::select! {
            _ = sigint.recv() => {
                info!("received SIGINT");
                let _ = signal_tx.send(()).await;
            },
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                let _ = signal_tx.send(()).await;
            }
        }
    });

    signal_rx
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("GoS MPLS network simulator")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .arg(
            Arg::with_name("scenario")
                .short("s")
                .long("scenario")
                .value_name("file")
                .help("Specify the scenario file to simulate."),
        )
        .arg(
            Arg::with_name("ticks")
                .short("t")
                .long("ticks")
                .value_name("count")
                .help("Stop after the given number of ticks."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let mut config = Config::load(config_file);
    if let Some(scenario) = matches.value_of("scenario") {
        config.simulation.scenario = scenario.to_owned();
    }
    let max_ticks = match matches.value_of("ticks").map(str::parse::<u64>) {
        Some(Ok(ticks)) => Some(ticks),
        Some(Err(error)) => {
            eprintln!("invalid tick count: {error}");
            std::process::exit(1);
        }
        None => None,
    };

    // Initialize tracing.
    init_tracing(&config.logging);

    // Build the simulated network.
    let mut scenario = match Scenario::load(&config.simulation.scenario) {
        Ok(scenario) => scenario,
        Err(error) => {
            error.log();
            std::process::exit(1);
        }
    };

    // We're ready to go!
    info!(scenario = %config.simulation.scenario, "starting up");

    // Main loop.
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to create async runtime");
            std::process::exit(1);
        }
    };
    let ticks = runtime.block_on(async {
        let signal_rx = signal_listener();
        runner::run(&mut scenario, &config.simulation, max_ticks, signal_rx)
            .await
    });

    // Summarize the run.
    let report = Report::new(&scenario, ticks);
    report.log();
    if config.simulation.report {
        match serde_json::to_string_pretty(&report) {
            Ok(data) => println!("{data}"),
            Err(error) => error!(%error, "failed to serialize report"),
        }
    }

    info!("exiting");
}
