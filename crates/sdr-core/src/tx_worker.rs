// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-client TX worker: serializes writes to one socket across many
//! producer threads without blocking them.
//!
//! Mirrors the shape of this crate's mio I/O threads — a bounded command
//! channel paired with a [`mio::Waker`] registered on a dedicated token, so
//! the worker can block in `poll` until either a buffer arrives or it is
//! told to stop.

use std::io::{self, Write};
use std::net::TcpStream as StdTcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::codec::PduCodec;
use crate::config::{DEFAULT_POLL_TIMEOUT, TX_QUEUE_HIGH_WATERMARK};
use crate::error::{Error, Result};

const SOCKET_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

enum Job {
    Write(Vec<u8>),
    /// Soft-stop sentinel: drain whatever is already queued ahead of it,
    /// then exit.
    Stop,
}

/// Handle held by producer threads (the server supervisor's TX thread, the
/// accept loop, inspector interception) to enqueue writes to one client.
#[derive(Clone)]
pub struct TxHandle {
    jobs: SyncSender<Job>,
    waker: Arc<Waker>,
    failed: Arc<AtomicBool>,
}

impl TxHandle {
    /// Enqueue a PDU payload (pre-serialization, post-framing is the
    /// worker's job). Returns [`Error::ResourceExhausted`] if the queue is
    /// at or above [`TX_QUEUE_HIGH_WATERMARK`] — the caller should mark this
    /// client failed on that error rather than block.
    pub fn enqueue(&self, payload: Vec<u8>) -> Result<()> {
        match self.jobs.try_send(Job::Write(payload)) {
            Ok(()) => {
                let _ = self.waker.wake();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.failed.store(true, Ordering::Release);
                Err(Error::ResourceExhausted)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.failed.store(true, Ordering::Release);
                Err(Error::ResourceExhausted)
            }
        }
    }

    /// Soft stop: the worker drains whatever is already queued, then exits.
    pub fn stop_soft(&self) {
        let _ = self.jobs.try_send(Job::Stop);
        let _ = self.waker.wake();
    }

    /// Hard stop: wake the worker immediately regardless of queue contents;
    /// it checks `failed` on the next wakeup and exits without draining.
    pub fn stop_hard(&self) {
        self.failed.store(true, Ordering::Release);
        let _ = self.waker.wake();
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

/// Owns the socket and runs the blocking write loop on its own thread.
pub struct TxWorker {
    poll: Poll,
    socket: TcpStream,
    jobs: Receiver<Job>,
    codec: PduCodec,
    failed: Arc<AtomicBool>,
}

impl TxWorker {
    /// Build a worker for `socket` and return it alongside the handle
    /// producers use to enqueue writes.
    pub fn new(socket: StdTcpStream, codec: PduCodec) -> io::Result<(Self, TxHandle)> {
        socket.set_nonblocking(true)?;
        let mut socket = TcpStream::from_std(socket);

        let poll = Poll::new()?;
        // Registered once; interest toggles between idle (waker only would
        // need socket deregistered, which mio disallows without an
        // intervening re-register) and write-pending via reregister below,
        // so the worker only wakes on real writability while a job queued.
        poll.registry().register(&mut socket, SOCKET_TOKEN, Interest::WRITABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        let (jobs_tx, jobs_rx) = sync_channel(TX_QUEUE_HIGH_WATERMARK);
        let failed = Arc::new(AtomicBool::new(false));

        let worker = Self {
            poll,
            socket,
            jobs: jobs_rx,
            codec,
            failed: failed.clone(),
        };
        let handle = TxHandle {
            jobs: jobs_tx,
            waker,
            failed,
        };
        Ok((worker, handle))
    }

    /// Spawn the worker loop on a dedicated OS thread.
    pub fn spawn(socket: StdTcpStream, codec: PduCodec) -> io::Result<(JoinHandle<()>, TxHandle)> {
        let (worker, handle) = Self::new(socket, codec)?;
        let join = thread::Builder::new()
            .name("sdr-tx-worker".to_string())
            .spawn(move || worker.run())?;
        Ok((join, handle))
    }

    /// Block until either a queued job or a wakeup, writing PDUs to the
    /// socket until told to stop or the socket errors out.
    ///
    /// The socket's writable interest is only live while a job is pending
    /// so an idle client parks purely on the waker instead of spinning on
    /// an always-writable send buffer.
    pub fn run(mut self) {
        let mut events = Events::with_capacity(8);
        let mut pending: Option<Vec<u8>> = None;
        let mut write_interest_armed = false;

        'outer: loop {
            if self.failed.load(Ordering::Acquire) {
                break;
            }

            if pending.is_none() {
                match self.jobs.try_recv() {
                    Ok(Job::Write(payload)) => pending = Some(payload),
                    Ok(Job::Stop) => break 'outer,
                    Err(_) => {}
                }
            }

            let want_write = pending.is_some();
            if want_write != write_interest_armed {
                let interest = if want_write {
                    Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                if self.poll.registry().reregister(&mut self.socket, SOCKET_TOKEN, interest).is_err() {
                    break;
                }
                write_interest_armed = want_write;
            }

            if let Err(e) = self.poll.poll(&mut events, Some(DEFAULT_POLL_TIMEOUT)) {
                if e.kind() != io::ErrorKind::Interrupted {
                    log::debug!("tx-worker: poll error: {e}");
                }
                continue;
            }

            for event in events.iter() {
                if event.token() == SOCKET_TOKEN && event.is_writable() {
                    if let Some(payload) = pending.take() {
                        if let Err(e) = self.write_pdu(&payload) {
                            log::debug!("tx-worker: write failed, marking client failed: {e}");
                            self.failed.store(true, Ordering::Release);
                            break 'outer;
                        }
                    }
                }
            }
        }
    }

    fn write_pdu(&mut self, payload: &[u8]) -> Result<()> {
        let framed = self.codec.encode(payload)?;
        self.socket.write_all(&framed).map_err(Error::Io)
    }
}
