// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! sdr-serverd - multiplexing SDR analyzer server
//!
//! Accepts control connections over TCP, authenticates each one, and
//! multiplexes them onto a single analyzer instance, optionally fanning
//! high-rate data out over UDP multicast instead of per-client unicast.
//!
//! # Usage
//!
//! ```bash
//! sdr-serverd --port 5555 --user alice --password secret
//! sdr-serverd --config server.json
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

mod config;
mod error;
mod stub_analyzer;

use config::ServerConfig;
use error::ServerdError;

/// Multiplexing SDR analyzer server.
#[derive(Parser, Debug)]
#[command(name = "sdr-serverd")]
#[command(version)]
#[command(about = "Multiplexing SDR analyzer server")]
struct Args {
    /// Load configuration from a JSON file; any flag below overrides a
    /// value it sets.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address.
    #[arg(short, long)]
    bind: Option<std::net::IpAddr>,

    /// Server name advertised in the hello.
    #[arg(long)]
    server_name: Option<String>,

    /// Username clients must authenticate as.
    #[arg(short, long)]
    user: Option<String>,

    /// Password clients must authenticate with.
    #[arg(long)]
    password: Option<String>,

    /// Advertise and serve a UDP multicast data plane.
    #[arg(long)]
    multicast: bool,

    /// Zlib compression threshold, in bytes.
    #[arg(long)]
    compression_threshold: Option<usize>,
}

impl Args {
    /// Apply every flag the caller actually set on top of `base`, so a
    /// config file supplies defaults and explicit flags win.
    fn apply(&self, mut base: ServerConfig) -> ServerConfig {
        if let Some(port) = self.port {
            base.port = port;
        }
        if let Some(bind) = self.bind {
            base.bind_address = bind;
        }
        if let Some(name) = &self.server_name {
            base.server_name = name.clone();
        }
        if let Some(user) = &self.user {
            base.user = user.clone();
        }
        if let Some(password) = &self.password {
            base.password = password.clone();
        }
        if self.multicast {
            base.multicast_enabled = true;
        }
        if let Some(threshold) = self.compression_threshold {
            base.compression_threshold = threshold;
        }
        base
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("sdr-serverd: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), ServerdError> {
    let base = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    let config = args.apply(base);

    let clients = Arc::new(sdr_core::client::ClientList::new(config.multicast_enabled));
    let supervisor = Arc::new(sdr_core::server::Supervisor::new(
        clients.clone(),
        config.server_name.clone(),
        config.user.clone(),
        config.password.clone(),
    ));

    let codec = sdr_core::codec::PduCodec::new(config.compression_threshold);
    let multicast_addr = config.multicast_enabled.then(|| {
        (
            u32::from(sdr_core::config::DEFAULT_MULTICAST_ADDR),
            sdr_core::config::DEFAULT_MULTICAST_PORT,
        )
    });
    let mut accept_handle = sdr_core::server::spawn_accept_loop(
        config.bind_addr(),
        supervisor.clone(),
        codec,
        config.server_name.clone(),
        multicast_addr,
    )?;

    log::info!(
        "sdr-serverd listening on {} (multicast {})",
        config.bind_addr(),
        if config.multicast_enabled { "enabled" } else { "disabled" }
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    // The analyzer is started lazily on the first successful auth and
    // halted once the last client departs, per the multiplexing server's
    // lifecycle; this loop owns that decision since it's the one holding
    // the concrete (stub) analyzer constructor.
    let mut analyzer_thread = None;
    while running.load(Ordering::SeqCst) {
        if supervisor.take_start_request() && !supervisor.analyzer_is_live() {
            let (handle, join) = stub_analyzer::spawn(sdr_core::wire::SourceInfo::default());
            supervisor.start_analyzer(handle);
            analyzer_thread = Some(join);
            log::info!("sdr-serverd: analyzer started on first authenticated client");
        }

        if supervisor.analyzer_is_live() && clients.is_empty() {
            supervisor.halt_analyzer();
            log::info!("sdr-serverd: analyzer halted, last client departed");
        }

        match supervisor.try_recv_analyzer_event() {
            Some(event) => {
                if !supervisor.handle_analyzer_event(event) {
                    break;
                }
            }
            None => std::thread::sleep(Duration::from_millis(50)),
        }
    }

    if let Some(join) = analyzer_thread {
        let _ = join.join();
    }

    accept_handle.stop();
    log::info!("sdr-serverd shut down");
    Ok(())
}
