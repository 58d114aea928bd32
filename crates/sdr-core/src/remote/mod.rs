// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client-side remote analyzer runtime: a reliable TCP control session plus
//! an optional UDP multicast data plane, exposing a local analyzer
//! interface indistinguishable from a direct-hardware one.

pub mod connect;

use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::os::fd::{AsRawFd, FromRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::net::UdpSocket as MioUdpSocket;
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::Socket;

use crate::auth;
use crate::codec::{PartialPdu, PduCodec};
use crate::config::{
    AUTH_FLAG_MULTICAST_OPT_IN, DEFAULT_POLL_TIMEOUT, HELLO_FLAG_MULTICAST, MAX_POLL_EVENTS, PROTOCOL_VERSION,
};
use crate::error::{Error, Result};
use crate::multicast::MulticastProcessor;
use crate::wire::{AnalyzerMessage, AnalyzerMsgType, ClientAuth, RemoteCall, SourceInfo};

const CANCEL_TOKEN: Token = Token(0);
const CONTROL_TOKEN: Token = Token(1);
const MULTICAST_TOKEN: Token = Token(2);

/// What the local subscriber observes out of band: an end-of-stream with a
/// reason, synthesized on any connection loss. No automatic reconnection is
/// performed here.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerStatus {
    SourceInfo(SourceInfo),
    Message(AnalyzerMessage),
    Eos(String),
}

struct Shared {
    cancelled: AtomicBool,
    eos: AtomicBool,
}

/// A single in-flight outbound call slot: acquiring, populating, and
/// serializing it happens under one short-lived mutex so the caller never
/// blocks on network I/O.
struct CallSlot {
    outbound: Sender<Vec<u8>>,
}

impl CallSlot {
    fn send(&self, call: RemoteCall) -> Result<()> {
        self.outbound.send(call.serialize()).map_err(|_| Error::Cancelled)
    }
}

/// Handle to a connected remote analyzer. Every tuning/control method
/// enqueues a serialized call for the TX thread and returns immediately.
pub struct RemoteAnalyzer {
    slot: Mutex<CallSlot>,
    shared: Arc<Shared>,
    waker: Arc<Waker>,
    pub status: Receiver<AnalyzerStatus>,
    _tx_thread: JoinHandle<()>,
    _rx_thread: Option<JoinHandle<()>>,
}

impl RemoteAnalyzer {
    /// Resolve `addr`, optionally join the server's advertised multicast
    /// group, authenticate, and start the TX/RX threads.
    pub fn connect(addr: SocketAddr, user: &str, password: &str, opt_in_multicast: bool) -> Result<Self> {
        let shared = Arc::new(Shared {
            cancelled: AtomicBool::new(false),
            eos: AtomicBool::new(false),
        });

        let poll = Poll::new().map_err(Error::Io)?;
        let waker = Arc::new(Waker::new(poll.registry(), CANCEL_TOKEN).map_err(Error::Io)?);

        let shared_for_connect = shared.clone();
        let mut stream = connect::connect_cancellable(
            addr,
            &waker,
            &move || shared_for_connect.cancelled.load(Ordering::Acquire),
            Duration::from_secs(10),
        )?;

        let codec = PduCodec::default();
        let mut partial = PartialPdu::new();
        let hello = read_one_call(&mut stream, &mut partial)?;
        let RemoteCall::ServerHello(hello) = hello else {
            return Err(Error::MalformedPdu);
        };
        if hello.protocol_major != PROTOCOL_VERSION.0 {
            return Err(Error::ProtocolVersion {
                major: hello.protocol_major,
                minor: hello.protocol_minor,
            });
        }

        let token = auth::compute_auth_token(user, password, &hello.sha256_salt);
        let server_supports_multicast = hello.flags & HELLO_FLAG_MULTICAST != 0;
        let want_multicast = opt_in_multicast && server_supports_multicast;

        let auth_call = ClientAuth {
            client_name: "sdr-remote".to_string(),
            protocol_major: PROTOCOL_VERSION.0,
            protocol_minor: PROTOCOL_VERSION.1,
            user: user.to_string(),
            sha256_token: token,
            flags: if want_multicast { AUTH_FLAG_MULTICAST_OPT_IN } else { 0 },
        };
        write_call(&mut stream, &RemoteCall::ClientAuth(auth_call), &codec)?;

        let reply = read_one_call(&mut stream, &mut partial)?;
        match reply {
            RemoteCall::AuthRejected => return Err(Error::AuthRejected),
            RemoteCall::SourceInfo(_) => {}
            _ => return Err(Error::MalformedPdu),
        }

        let multicast_socket = if want_multicast {
            hello.multicast_addr.and_then(|(addr_bits, port)| {
                open_multicast_receiver(Ipv4Addr::from(addr_bits), port).ok()
            })
        } else {
            None
        };

        let (outbound_tx, outbound_rx) = channel::<Vec<u8>>();
        let (status_tx, status_rx) = channel::<AnalyzerStatus>();

        // mio::net::TcpStream has no try_clone(); duplicate the underlying
        // fd via socket2 to give the TX thread its own std::net::TcpStream
        // over the same connection, same as the server's accept loop.
        let borrowed = unsafe { Socket::from_raw_fd(stream.as_raw_fd()) };
        let duplicated = borrowed.try_clone().map_err(Error::Io);
        std::mem::forget(borrowed);
        let tx_stream = std::net::TcpStream::from(duplicated?);
        let tx_shared = shared.clone();
        let tx_thread = thread::Builder::new()
            .name("sdr-remote-tx".to_string())
            .spawn(move || run_tx_thread(tx_stream, outbound_rx, codec, tx_shared))
            .map_err(Error::Io)?;

        let rx_shared = shared.clone();
        let rx_thread = thread::Builder::new()
            .name("sdr-remote-rx".to_string())
            .spawn(move || run_rx_thread(stream, multicast_socket, poll, status_tx, rx_shared))
            .map_err(Error::Io)?;

        Ok(Self {
            slot: Mutex::new(CallSlot { outbound: outbound_tx }),
            shared,
            waker,
            status: status_rx,
            _tx_thread: tx_thread,
            _rx_thread: Some(rx_thread),
        })
    }

    fn send(&self, call: RemoteCall) -> Result<()> {
        self.slot.lock().unwrap().send(call)
    }

    pub fn set_frequency(&self, freq: f64, lnb: f64) -> Result<()> {
        self.send(RemoteCall::SetFrequency { freq, lnb })
    }

    pub fn set_gain(&self, name: impl Into<String>, value: f64) -> Result<()> {
        self.send(RemoteCall::SetGain { name: name.into(), value })
    }

    pub fn set_antenna(&self, name: impl Into<String>) -> Result<()> {
        self.send(RemoteCall::SetAntenna(name.into()))
    }

    pub fn set_bandwidth(&self, bandwidth: f64) -> Result<()> {
        self.send(RemoteCall::SetBandwidth(bandwidth))
    }

    pub fn set_ppm(&self, ppm: f64) -> Result<()> {
        self.send(RemoteCall::SetPpm(ppm))
    }

    pub fn set_agc(&self, enabled: bool) -> Result<()> {
        self.send(RemoteCall::SetAgc(enabled))
    }

    pub fn set_dc_remove(&self, enabled: bool) -> Result<()> {
        self.send(RemoteCall::SetDcRemove(enabled))
    }

    pub fn set_iq_reverse(&self, enabled: bool) -> Result<()> {
        self.send(RemoteCall::SetIqReverse(enabled))
    }

    pub fn force_eos(&self) -> Result<()> {
        self.send(RemoteCall::ForceEos)
    }

    pub fn set_sweep_strategy(&self, strategy: u32) -> Result<()> {
        self.send(RemoteCall::SetSweepStrategy(strategy))
    }

    pub fn set_spectrum_partitioning(&self, partitions: u32) -> Result<()> {
        self.send(RemoteCall::SetSpectrumPartitioning(partitions))
    }

    pub fn set_hop_range(&self, min: f64, max: f64) -> Result<()> {
        self.send(RemoteCall::SetHopRange { min, max })
    }

    pub fn set_buffering_size(&self, size: u32) -> Result<()> {
        self.send(RemoteCall::SetBufferingSize(size))
    }

    pub fn write_message(&self, msg: AnalyzerMessage) -> Result<()> {
        self.send(RemoteCall::AnalyzerMessage(msg))
    }

    pub fn request_halt(&self) -> Result<()> {
        self.send(RemoteCall::RequestHalt)
    }

    pub fn is_eos(&self) -> bool {
        self.shared.eos.load(Ordering::Acquire)
    }

    /// Hard-stop both threads.
    pub fn disconnect(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        let _ = self.waker.wake();
    }
}

fn open_multicast_receiver(group: Ipv4Addr, port: u16) -> Result<MioUdpSocket> {
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let socket = std::net::UdpSocket::bind(bind_addr).map_err(Error::Io)?;
    let local_iface = local_ip_address::local_ip()
        .ok()
        .and_then(|ip| match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .unwrap_or(Ipv4Addr::UNSPECIFIED);
    socket.join_multicast_v4(&group, &local_iface).map_err(Error::Io)?;
    socket.set_nonblocking(true).map_err(Error::Io)?;
    Ok(MioUdpSocket::from_std(socket))
}

fn read_one_call(stream: &mut mio::net::TcpStream, partial: &mut PartialPdu) -> Result<RemoteCall> {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Err(Error::Io(std::io::Error::from(ErrorKind::UnexpectedEof))),
            Ok(n) => {
                if let Some(payload) = partial.feed(&buf[..n])? {
                    return RemoteCall::deserialize(&payload);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

fn write_call(stream: &mut mio::net::TcpStream, call: &RemoteCall, codec: &PduCodec) -> Result<()> {
    let framed = codec.encode(&call.serialize())?;
    stream.write_all(&framed).map_err(Error::Io)
}

fn run_tx_thread(mut stream: std::net::TcpStream, outbound: Receiver<Vec<u8>>, codec: PduCodec, shared: Arc<Shared>) {
    for payload in outbound {
        if shared.cancelled.load(Ordering::Acquire) {
            break;
        }
        let framed = match codec.encode(&payload) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("remote-tx: encode error: {e}");
                continue;
            }
        };
        if let Err(e) = stream.write_all(&framed) {
            log::debug!("remote-tx: write error, exiting: {e}");
            break;
        }
    }
}

fn run_rx_thread(
    mut control: mio::net::TcpStream,
    mut multicast: Option<MioUdpSocket>,
    poll: Poll,
    status: Sender<AnalyzerStatus>,
    shared: Arc<Shared>,
) {
    let registry = poll.registry();
    if registry.register(&mut control, CONTROL_TOKEN, Interest::READABLE).is_err() {
        return;
    }
    if let Some(mc) = multicast.as_mut() {
        let _ = registry.register(mc, MULTICAST_TOKEN, Interest::READABLE);
    }

    let mut poll = poll;
    let mut events = Events::with_capacity(MAX_POLL_EVENTS);
    let mut partial = PartialPdu::new();
    let mut mc_processor = MulticastProcessor::new();
    let mut mc_buf = [0u8; 2048];
    let mut control_buf = [0u8; 4096];
    let mut pending_mc: Vec<RemoteCall> = Vec::new();

    loop {
        if shared.cancelled.load(Ordering::Acquire) {
            return;
        }

        // Deliver anything the multicast processor already reassembled
        // before touching the network again, per the interleaving rule.
        while let Some(call) = pending_mc.pop() {
            deliver(call, &status, &shared);
        }

        if let Err(e) = poll.poll(&mut events, Some(DEFAULT_POLL_TIMEOUT)) {
            if e.kind() != ErrorKind::Interrupted {
                log::debug!("remote-rx: poll error: {e}");
            }
            continue;
        }

        for event in events.iter() {
            match event.token() {
                CANCEL_TOKEN => return,
                CONTROL_TOKEN => loop {
                    match control.read(&mut control_buf) {
                        Ok(0) => {
                            shared.eos.store(true, Ordering::Release);
                            let _ = status.send(AnalyzerStatus::Eos("connection closed".to_string()));
                            return;
                        }
                        Ok(n) => match partial.feed(&control_buf[..n]) {
                            Ok(Some(payload)) => match RemoteCall::deserialize(&payload) {
                                Ok(call) => deliver(call, &status, &shared),
                                Err(e) => log::debug!("remote-rx: malformed call: {e}"),
                            },
                            Ok(None) => {}
                            Err(e) => {
                                log::debug!("remote-rx: pdu framing error: {e}");
                                let _ = status.send(AnalyzerStatus::Eos(e.to_string()));
                                return;
                            }
                        },
                        Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) => {
                            let _ = status.send(AnalyzerStatus::Eos(e.to_string()));
                            return;
                        }
                    }
                },
                MULTICAST_TOKEN => {
                    if let Some(mc) = multicast.as_mut() {
                        loop {
                            match mc.recv(&mut mc_buf) {
                                Ok(n) => {
                                    if let Some(event) = mc_processor.process(&mc_buf[..n]) {
                                        push_mc_event(event, &mut pending_mc);
                                    }
                                    if let Some(event) = mc_processor.trigger_on_call() {
                                        push_mc_event(event, &mut pending_mc);
                                    }
                                }
                                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                                Err(e) => {
                                    log::debug!("remote-rx: multicast recv error: {e}");
                                    break;
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn push_mc_event(event: crate::multicast::MulticastEvent, pending: &mut Vec<RemoteCall>) {
    match event {
        crate::multicast::MulticastEvent::Call(call) => pending.push(call),
        crate::multicast::MulticastEvent::Psd(_frame) => {
            // PSD frames reach the subscriber queue as analyzer "Data"
            // messages at a higher layer; the core here only guarantees
            // they were reassembled, matching the lossy-by-design contract.
        }
    }
}

fn deliver(call: RemoteCall, status: &Sender<AnalyzerStatus>, shared: &Shared) {
    match call {
        RemoteCall::SourceInfo(info) => {
            let _ = status.send(AnalyzerStatus::SourceInfo(info));
        }
        RemoteCall::ForceEos => {
            shared.eos.store(true, Ordering::Release);
            let _ = status.send(AnalyzerStatus::Eos("server forced end of stream".to_string()));
        }
        RemoteCall::AnalyzerMessage(msg) => {
            let _ = status.send(AnalyzerStatus::Message(msg));
        }
        _ => {}
    }
}
