// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The accept/RX thread: single dedicated thread polling the listener, the
//! cancellation waker, and every session socket, feeding full PDUs to the
//! [`Supervisor`](crate::server::Supervisor) call handler.

use std::collections::HashMap;
use std::io::{self, ErrorKind, Read};
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::Socket;

use crate::client::list::{LISTENER_TOKEN, SESSION_TOKEN_START, WAKER_TOKEN};
use crate::client::ClientSession;
use crate::codec::PduCodec;
use crate::config::{DEFAULT_POLL_TIMEOUT, MAX_POLL_EVENTS};
use crate::server::Supervisor;
use crate::tx_worker::TxWorker;
use crate::wire::RemoteCall;

/// Join handle plus the means to stop the accept thread from the outside.
pub struct AcceptLoopHandle {
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AcceptLoopHandle {
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        let _ = self.waker.wake();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

struct AcceptLoop {
    poll: Poll,
    listener: TcpListener,
    supervisor: Arc<Supervisor>,
    codec: PduCodec,
    running: Arc<AtomicBool>,
    sockets: HashMap<usize, TcpStream>,
    server_name: String,
    multicast_addr: Option<(u32, u16)>,
}

/// Spawn the accept/RX thread bound to `addr`. `multicast_addr`, if set, is
/// advertised in every session's hello and determines whether
/// `HELLO_FLAG_MULTICAST` is set.
pub fn spawn(
    addr: SocketAddr,
    supervisor: Arc<Supervisor>,
    codec: PduCodec,
    server_name: impl Into<String>,
    multicast_addr: Option<(u32, u16)>,
) -> io::Result<AcceptLoopHandle> {
    let poll = Poll::new()?;
    let mut listener = TcpListener::bind(addr)?;
    poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
    let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
    let running = Arc::new(AtomicBool::new(true));

    let accept_loop = AcceptLoop {
        poll,
        listener,
        supervisor,
        codec,
        running: running.clone(),
        sockets: HashMap::new(),
        server_name: server_name.into(),
        multicast_addr,
    };

    let thread = thread::Builder::new()
        .name("sdr-accept".to_string())
        .spawn(move || accept_loop.run())?;

    Ok(AcceptLoopHandle {
        waker,
        running,
        thread: Some(thread),
    })
}

impl AcceptLoop {
    fn run(mut self) {
        let mut events = Events::with_capacity(MAX_POLL_EVENTS);

        while self.running.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, Some(DEFAULT_POLL_TIMEOUT)) {
                if e.kind() != ErrorKind::Interrupted {
                    log::warn!("accept-loop: poll error: {e}");
                }
                continue;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_pending(),
                    WAKER_TOKEN => {}
                    Token(raw) if raw >= SESSION_TOKEN_START => {
                        if event.is_readable() {
                            self.readable(raw);
                        }
                    }
                    _ => {}
                }
            }

            for token in self.supervisor.clients.sweep_failed() {
                self.sockets.remove(&token);
            }
        }
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, remote_addr)) => {
                    // The mio socket keeps ownership of the fd for this
                    // thread's Poll registration; the TX worker needs its
                    // own std::net::TcpStream over the same connection, so
                    // duplicate the fd via socket2 rather than splitting
                    // ownership of one handle across two registries.
                    let borrowed = unsafe { Socket::from_raw_fd(stream.as_raw_fd()) };
                    let duplicated = borrowed.try_clone();
                    std::mem::forget(borrowed);
                    let std_stream = match duplicated {
                        Ok(dup) => std::net::TcpStream::from(dup),
                        Err(e) => {
                            log::warn!("accept-loop: failed to duplicate accepted socket: {e}");
                            continue;
                        }
                    };

                    let codec = self.codec;
                    let (_join, tx) = match TxWorker::spawn(std_stream, codec) {
                        Ok(pair) => pair,
                        Err(e) => {
                            log::warn!("accept-loop: failed to spawn tx worker: {e}");
                            continue;
                        }
                    };

                    let token = self.supervisor.clients.insert(|token, epoch| {
                        let mut session = ClientSession::new(token, remote_addr, tx, epoch);
                        if let Err(e) = session.send_hello(
                            &self.server_name,
                            crate::config::AUTH_MODE_USER_PASSWORD,
                            self.multicast_addr,
                        ) {
                            log::warn!("accept-loop: failed to send hello to {remote_addr}: {e}");
                        }
                        session
                    });

                    if self
                        .poll
                        .registry()
                        .register(&mut stream, Token(token), Interest::READABLE)
                        .is_ok()
                    {
                        self.sockets.insert(token, stream);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("accept-loop: accept error: {e}");
                    break;
                }
            }
        }
    }

    fn readable(&mut self, token: usize) {
        let Some(socket) = self.sockets.get_mut(&token) else {
            return;
        };

        let mut buf = [0u8; 4096];
        loop {
            match socket.read(&mut buf) {
                Ok(0) => {
                    self.supervisor.kick_client(token);
                    return;
                }
                Ok(n) => {
                    let fed = self.supervisor.clients.with_session(token, |s| s.feed(&buf[..n]));
                    match fed {
                        Some(Ok(Some(payload))) => match RemoteCall::deserialize(&payload) {
                            Ok(call) => {
                                if let Err(e) = self.supervisor.handle_call(token, call) {
                                    log::debug!("accept-loop: call handler error for {token}: {e}");
                                    self.supervisor.kick_client(token);
                                    return;
                                }
                            }
                            Err(e) => {
                                log::debug!("accept-loop: malformed call from {token}: {e}");
                                self.supervisor.kick_client(token);
                                return;
                            }
                        },
                        Some(Ok(None)) => {}
                        Some(Err(e)) => {
                            log::debug!("accept-loop: pdu framing error for {token}: {e}");
                            self.supervisor.kick_client(token);
                            return;
                        }
                        None => return,
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::debug!("accept-loop: read error for {token}: {e}");
                    self.supervisor.kick_client(token);
                    return;
                }
            }
        }
    }
}
