// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # sdr-core - remote SDR analyzer multiplexing core
//!
//! Thread-and-channel building blocks for a server that multiplexes many
//! control clients onto a single tunable analyzer, and for clients that
//! talk to one remotely over TCP plus an optional UDP multicast data plane.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sdr_core::remote::RemoteAnalyzer;
//!
//! fn main() -> sdr_core::Result<()> {
//!     let addr = "127.0.0.1:5555".parse().unwrap();
//!     let analyzer = RemoteAnalyzer::connect(addr, "user", "pass", true)?;
//!     analyzer.set_frequency(100_000_000.0, 0.0)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------------------+
//! |                        Client process                           |
//! |   RemoteAnalyzer -> TX thread (writer) / RX thread (reader)     |
//! |           TCP control channel  +  UDP multicast data plane      |
//! +-----------------------------------------------------------------+
//!                               |
//! +-----------------------------------------------------------------+
//! |                        Server process                           |
//! |   accept/RX thread -> Supervisor -> AnalyzerHandle              |
//! |   one TxWorker thread per client -> ClientList / InspectorTable |
//! +-----------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`remote::RemoteAnalyzer`] | Client-side handle to a remote analyzer |
//! | [`server::Supervisor`] | Server-side call handler and analyzer lifecycle owner |
//! | [`client::ClientList`] | Server-wide registry of connected control sessions |
//! | [`device::DeviceFacade`] | Merges discoveries into one device catalog |
//! | [`multicast::MulticastProcessor`] | Reassembles fragmented multicast superframes |
//!
//! ## Modules Overview
//!
//! - [`remote`] - client-side TX/RX threads and the exposed analyzer interface
//! - [`server`] - accept loop, call supervisor, inspector translation table
//! - [`client`] - per-connection session state and the server's session registry
//! - [`device`] - device specs, discovery merge, and the canonical-URI UUID scheme
//! - [`multicast`] - UDP fragment framing and reassembly
//! - [`wire`] - the `RemoteCall` tagged union and its binary codec
//! - [`codec`] - PDU framing (length-prefix, magic, optional zlib)
//! - [`auth`] - salted-challenge authentication
//! - [`analyzer`] - the out-of-scope DSP engine's command/event boundary
//! - [`config`] - wire and runtime constants
//! - [`error`] - the crate's error type

pub mod analyzer;
pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod multicast;
pub mod remote;
pub mod server;
pub mod tx_worker;
pub mod wire;

pub use error::{Error, Result};
pub use remote::RemoteAnalyzer;
pub use server::Supervisor;
