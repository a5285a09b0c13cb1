//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

use crate::debug::Debug;

// Timer event delivered to every node and link once per tick.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TimerEvent {
    pub tick_duration_ns: u64,
    // Simulated time at the end of this tick.
    pub upper_limit_timestamp: u64,
}

// Global simulation clock.
//
// The clock only decides when the next tick is emitted; pausing, resuming or
// resetting it never changes what a tick means.
#[derive(Debug)]
pub struct Clock {
    tick_ns: u64,
    duration_ns: u64,
    current_ns: u64,
    state: ClockState,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockState {
    Running,
    Paused,
    Finished,
}

// ===== impl Clock =====

impl Clock {
    pub const DFLT_TICK_NS: u64 = 10_000;
    pub const DFLT_DURATION_NS: u64 = 100_000_000;

    pub fn new(tick_ns: u64, duration_ns: u64) -> Clock {
        Clock {
            tick_ns: tick_ns.max(1),
            duration_ns,
            current_ns: 0,
            state: ClockState::Running,
        }
    }

    // Emits the next tick, unless the clock is paused or finished.
    pub fn next_tick(&mut self) -> Option<TimerEvent> {
        if self.state != ClockState::Running {
            return None;
        }
        self.advance()
    }

    // Emits a single tick regardless of the clock being paused.
    pub fn step(&mut self) -> Option<TimerEvent> {
        if self.state == ClockState::Finished {
            return None;
        }
        self.advance()
    }

    fn advance(&mut self) -> Option<TimerEvent> {
        if self.current_ns >= self.duration_ns {
            self.set_state(ClockState::Finished);
            return None;
        }

        let tick_duration_ns =
            self.tick_ns.min(self.duration_ns - self.current_ns);
        self.current_ns += tick_duration_ns;
        if self.current_ns >= self.duration_ns {
            self.set_state(ClockState::Finished);
        }
        Some(TimerEvent {
            tick_duration_ns,
            upper_limit_timestamp: self.current_ns,
        })
    }

    pub fn pause(&mut self) {
        if self.state == ClockState::Running {
            self.set_state(ClockState::Paused);
        }
    }

    pub fn resume(&mut self) {
        if self.state == ClockState::Paused {
            self.set_state(ClockState::Running);
        }
    }

    pub fn reset(&mut self) {
        self.current_ns = 0;
        self.set_state(ClockState::Running);
    }

    fn set_state(&mut self, state: ClockState) {
        if self.state != state {
            Debug::ClockStateChange(&self.current_ns, &self.state, &state)
                .log();
            self.state = state;
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn current_ns(&self) -> u64 {
        self.current_ns
    }

    pub fn tick_ns(&self) -> u64 {
        self.tick_ns
    }

    pub fn duration_ns(&self) -> u64 {
        self.duration_ns
    }

    pub fn is_finished(&self) -> bool {
        self.state == ClockState::Finished
    }
}

impl Default for Clock {
    fn default() -> Clock {
        Clock::new(Self::DFLT_TICK_NS, Self::DFLT_DURATION_NS)
    }
}

// ===== impl ClockState =====

impl std::fmt::Display for ClockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockState::Running => write!(f, "running"),
            ClockState::Paused => write!(f, "paused"),
            ClockState::Finished => write!(f, "finished"),
        }
    }
}
