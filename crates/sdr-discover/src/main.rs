// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! sdr-discover - dump live SDR device discovery state
//!
//! Registers the two discovery kinds the core recognizes (`local`,
//! `multicast`) and prints the facade's merged, epoch-filtered device list.
//! Hardware enumeration is outside this core's scope, so the local
//! transport reports the devices named on the command line as if a driver
//! had just enumerated them; the multicast transport listens for real
//! `announce` superframes from a live `sdr-serverd` and uses their arrival
//! as a liveness signal.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use colored::*;
use mio::net::UdpSocket;
use sdr_core::device::{device_uuid, DeviceFacade, DeviceProperties, DiscoveryKind};
use sdr_core::multicast::MulticastProcessor;

mod error;
use error::DiscoverError;

/// Dump live SDR device discovery state.
#[derive(Parser, Debug)]
#[command(name = "sdr-discover")]
#[command(version)]
#[command(about = "Dump device discovery state (local + multicast transports)")]
struct Args {
    /// A device to report from the local transport, given as `label`.
    /// Repeat to report several. With none given, the local transport
    /// reports an empty list every cycle.
    #[arg(short = 'd', long = "local-device")]
    local_devices: Vec<String>,

    /// Multicast group to listen on for server announce superframes.
    #[arg(long, default_value_t = sdr_core::config::DEFAULT_MULTICAST_ADDR)]
    multicast_addr: Ipv4Addr,

    /// Multicast port to listen on.
    #[arg(long, default_value_t = sdr_core::config::DEFAULT_MULTICAST_PORT)]
    multicast_port: u16,

    /// Disable the multicast listener (local transport only).
    #[arg(long)]
    no_multicast: bool,

    /// Output format: pretty, json.
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Continuous monitoring mode (refresh every N seconds).
    #[arg(short = 'w', long)]
    watch: Option<u64>,

    /// Seconds to wait for the first scan cycle before the first dump.
    #[arg(long, default_value = "2")]
    timeout: u64,

    /// Quiet mode - compact output.
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(OutputFormat::Pretty),
            "json" | "j" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown format: {s}")),
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), DiscoverError> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    let facade = Arc::new(DeviceFacade::new());
    spawn_local_worker(facade.clone(), args.local_devices.clone(), running.clone());
    if !args.no_multicast {
        spawn_multicast_worker(facade.clone(), args.multicast_addr, args.multicast_port, running.clone())?;
    }

    if !args.quiet {
        eprintln!("{} Device discovery dump", ">>>".green().bold());
    }

    if args.timeout > 0 {
        thread::sleep(Duration::from_secs(args.timeout));
    }

    if let Some(watch_interval) = args.watch {
        let interval = Duration::from_secs(watch_interval.max(1));
        while running.load(Ordering::SeqCst) {
            print!("\x1B[2J\x1B[1;1H");
            dump(&facade, args);
            thread::sleep(interval);
        }
    } else {
        dump(&facade, args);
    }

    Ok(())
}

fn spawn_local_worker(facade: Arc<DeviceFacade>, labels: Vec<String>, running: Arc<AtomicBool>) {
    let discovery = facade.register_discovery(DiscoveryKind::Local);
    thread::Builder::new()
        .name("sdr-discover-local".to_string())
        .spawn(move || {
            while running.load(Ordering::SeqCst) {
                let devices: Vec<DeviceProperties> = labels.iter().map(|l| DeviceProperties::new(l.clone())).collect();
                discovery.scan(devices);
                let accepted = discovery.accept();
                let merged = accepted.into_iter().map(|props| {
                    let mut traits = BTreeMap::new();
                    traits.insert("device".to_string(), props.label.clone());
                    let uuid = device_uuid("local", "enumerated", &traits);
                    (uuid, props)
                });
                facade.merge(&discovery, merged);
                thread::sleep(Duration::from_secs(2));
            }
        })
        .expect("failed to spawn local discovery worker");
}

fn spawn_multicast_worker(
    facade: Arc<DeviceFacade>,
    addr: Ipv4Addr,
    port: u16,
    running: Arc<AtomicBool>,
) -> Result<(), DiscoverError> {
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let socket = std::net::UdpSocket::bind(bind_addr)?;
    socket.join_multicast_v4(&addr, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_nonblocking(true)?;
    socket.set_read_timeout(None)?;
    let mut socket = UdpSocket::from_std(socket);

    let discovery = facade.register_discovery(DiscoveryKind::Multicast);
    thread::Builder::new()
        .name("sdr-discover-multicast".to_string())
        .spawn(move || {
            let mut poll = mio::Poll::new().expect("mio poll");
            poll.registry()
                .register(&mut socket, mio::Token(0), mio::Interest::READABLE)
                .expect("register multicast socket");
            let mut events = mio::Events::with_capacity(8);
            let mut processor = MulticastProcessor::new();
            let mut buf = [0u8; 2048];

            while running.load(Ordering::SeqCst) {
                if poll.poll(&mut events, Some(Duration::from_millis(500))).is_err() {
                    continue;
                }
                let mut saw_announce = false;
                for event in events.iter() {
                    if event.token() != mio::Token(0) {
                        continue;
                    }
                    loop {
                        match socket.recv(&mut buf) {
                            Ok(n) => {
                                let _ = processor.process(&buf[..n]);
                                saw_announce = true;
                            }
                            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                            Err(e) => {
                                log::debug!("sdr-discover: multicast recv error: {e}");
                                break;
                            }
                        }
                    }
                }
                if saw_announce {
                    // No device identity travels on the announce path; a
                    // sighting only proves liveness, so re-accept an empty
                    // scan purely to advance the epoch the facade checks.
                    discovery.scan(Vec::new());
                    discovery.accept();
                    facade.merge(&discovery, std::iter::empty());
                }
            }
        })
        .expect("failed to spawn multicast discovery worker");
    Ok(())
}

fn dump(facade: &DeviceFacade, args: &Args) {
    let devices = facade.current_devices();
    match args.format {
        OutputFormat::Pretty => print_pretty(&devices, args),
        OutputFormat::Json => print_json(&devices),
    }
}

fn print_pretty(devices: &[DeviceProperties], args: &Args) {
    println!();
    println!("{}", "=== SDR Device Discovery State ===".bold());
    println!();
    println!("{} {} device(s) current", "Devices:".cyan().bold(), devices.len());
    println!();

    for (i, d) in devices.iter().enumerate() {
        if args.quiet {
            println!(
                "  [{}] {} ({} antenna(s), {} gain stage(s))",
                i + 1,
                d.label.green(),
                d.antennas.len(),
                d.gains.len()
            );
            continue;
        }
        println!("  {} {}", format!("[{}]", i + 1).yellow(), d.label.green().bold());
        println!("      Antennas: {}", d.antennas.join(", ").white());
        println!(
            "      Frequency range: {:.0} Hz - {:.0} Hz",
            d.freq_range.0, d.freq_range.1
        );
        println!("      Channels: {}", d.channel_count);
        println!("      Epoch: {}", d.epoch);
        for (name, gain) in &d.gains {
            println!(
                "      Gain[{}]: {:.1}..{:.1} step {:.1} (default {:.1})",
                name, gain.min, gain.max, gain.step, gain.default
            );
        }
        println!();
    }

    println!("{}", "--- Summary ---".dimmed());
    println!("  Devices: {}", devices.len().to_string().white());
    println!();
}

fn print_json(devices: &[DeviceProperties]) {
    print!("{{\"devices\":[");
    for (i, d) in devices.iter().enumerate() {
        if i > 0 {
            print!(",");
        }
        print!(
            "{{\"label\":\"{}\",\"antennas\":[{}],\"channel_count\":{},\"epoch\":{},\"freq_range\":[{},{}]}}",
            d.label,
            d.antennas.iter().map(|a| format!("\"{a}\"")).collect::<Vec<_>>().join(","),
            d.channel_count,
            d.epoch,
            d.freq_range.0,
            d.freq_range.1
        );
    }
    println!("]}}");
}
