//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]
#![allow(clippy::too_many_arguments)]

pub mod clock;
pub mod collections;
pub mod config;
pub mod debug;
pub mod dmgp;
pub mod error;
pub mod failover;
pub mod gpsrp;
pub mod link;
pub mod matrix;
pub mod node;
pub mod packet;
pub mod port;
pub mod scenario;
pub mod tldp;
pub mod topology;
pub mod traffic;
