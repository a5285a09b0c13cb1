//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use gosim_mpls::scenario::Scenario;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::Simulation;

// Ticks run per wakeup when the simulation isn't paced.
const BATCH_TICKS: u64 = 1000;

// Clock control command read from stdin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Command {
    Pause,
    Resume,
    Step,
    Reset,
    Stop,
}

// ===== impl Command =====

impl Command {
    fn parse(line: &str) -> Option<Command> {
        match line.trim() {
            "p" | "pause" => Some(Command::Pause),
            "r" | "resume" => Some(Command::Resume),
            "s" | "step" => Some(Command::Step),
            "x" | "reset" => Some(Command::Reset),
            "q" | "quit" | "stop" => Some(Command::Stop),
            _ => None,
        }
    }
}

// ===== helper functions =====

fn command_listener() -> mpsc::Receiver<Command> {
    let (command_tx, command_rx) = mpsc::channel(4);

    tokio::task::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(command) = Command::parse(&line) else {
                warn!(%line, "unknown command");
                continue;
            };
            if command_tx.send(command).await.is_err() {
                break;
            }
        }
    });

    command_rx
}

async fn next_command(
    command_rx: &mut Option<mpsc::Receiver<Command>>,
) -> Option<Command> {
    match command_rx {
        Some(command_rx) => command_rx.recv().await,
        None => std::future::pending().await,
    }
}

// ===== global functions =====

// Drives the scenario clock until it finishes, the tick limit is reached or
// the process is told to stop.
//
// Returns the number of ticks run since the last reset.
pub(crate) async fn run(
    scenario: &mut Scenario,
    cfg: &Simulation,
    max_ticks: Option<u64>,
    mut signal_rx: mpsc::Receiver<()>,
) -> u64 {
    let mut command_rx = cfg.interactive.then(command_listener);
    let (period, batch) = match cfg.step_interval_ms {
        0 => (Duration::from_millis(1), BATCH_TICKS),
        ms => (Duration::from_millis(ms), 1),
    };
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0;

    loop {
        tokio::select! {
            _ = signal_rx.recv() => {
                break;
            }
            Some(command) = next_command(&mut command_rx) => {
                info!(?command, "clock command");
                match command {
                    Command::Pause => scenario.clock.pause(),
                    Command::Resume => scenario.clock.resume(),
                    Command::Step => {
                        if scenario.step() {
                            ticks += 1;
                        }
                    }
                    Command::Reset => {
                        if let Err(error) = scenario.reset() {
                            error.log();
                            break;
                        }
                        ticks = 0;
                    }
                    Command::Stop => break,
                }
            }
            _ = interval.tick() => {
                let limit = max_ticks.map_or(batch, |max| {
                    batch.min(max.saturating_sub(ticks))
                });
                let mut count = 0;
                while count < limit && scenario.tick() {
                    count += 1;
                }
                ticks += count;

                if max_ticks.is_some_and(|max| ticks >= max) {
                    info!(%ticks, "tick limit reached");
                    break;
                }
                if scenario.clock.is_finished() && !cfg.interactive {
                    break;
                }
            }
        }
    }

    ticks
}

// ===== unit tests =====
