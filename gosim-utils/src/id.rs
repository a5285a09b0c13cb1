//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// Monotonic identifier generator.
//
// Identifiers start at 1 (0 is never handed out) and the generator refuses to
// wrap around: once the last value has been returned every subsequent call
// fails until the generator is reset.
#[derive(Clone, Debug)]
pub struct IdGenerator {
    next: u32,
    exhausted: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum IdError {
    Exhausted,
}

// ===== impl IdGenerator =====

impl IdGenerator {
    pub fn new() -> IdGenerator {
        IdGenerator::starting_at(1)
    }

    pub fn starting_at(first: u32) -> IdGenerator {
        IdGenerator {
            next: first.max(1),
            exhausted: false,
        }
    }

    pub fn next_id(&mut self) -> Result<u32, IdError> {
        if self.exhausted {
            return Err(IdError::Exhausted);
        }

        let id = self.next;
        match self.next.checked_add(1) {
            Some(next) => self.next = next,
            None => self.exhausted = true,
        }
        Ok(id)
    }

    pub fn reset(&mut self) {
        self.next = 1;
        self.exhausted = false;
    }
}

impl Default for IdGenerator {
    fn default() -> IdGenerator {
        IdGenerator::new()
    }
}

// ===== impl IdError =====

impl std::fmt::Display for IdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdError::Exhausted => write!(f, "identifier space exhausted"),
        }
    }
}

impl std::error::Error for IdError {}
