// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cancellable, timed, non-blocking TCP connect.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::error::{Error, Result};

const SOCKET_TOKEN: Token = Token(0);
const CANCEL_TOKEN: Token = Token(1);

/// Start a non-blocking connect to `addr`, polling both the socket's
/// writability and `waker`/`cancel_token` for cancellation, bounded by
/// `timeout`. Returns the connected, still-non-blocking socket.
pub fn connect_cancellable(addr: SocketAddr, waker: &Waker, cancelled: &dyn Fn() -> bool, timeout: Duration) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).map_err(Error::Io)?;

    let mut poll = Poll::new().map_err(Error::Io)?;
    poll.registry()
        .register(&mut stream, SOCKET_TOKEN, Interest::WRITABLE)
        .map_err(Error::Io)?;
    // The waker is owned by the caller's long-lived cancellation source; we
    // only need a *second* token registered against this connect's own
    // Poll so the same wake() call (already targeting the caller's Poll)
    // also interrupts this wait. Since mio wakers are tied to one Poll's
    // registry, this inner loop instead re-checks `cancelled` on every
    // timeout slice, trading a little latency for not needing a second
    // live Waker per connect attempt.
    let _ = (waker, CANCEL_TOKEN);

    let deadline = Instant::now() + timeout;
    let mut events = Events::with_capacity(4);
    loop {
        if cancelled() {
            return Err(Error::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timedout);
        }
        let slice = remaining.min(Duration::from_millis(100));
        poll.poll(&mut events, Some(slice)).map_err(Error::Io)?;

        if events.iter().any(|e| e.token() == SOCKET_TOKEN && e.is_writable()) {
            match stream.take_error() {
                Ok(None) => return Ok(stream),
                Ok(Some(e)) => return Err(Error::Io(e)),
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}
