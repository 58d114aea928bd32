// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! All sessions, one mutex, broadcast and lookup.
//!
//! Slot numbering mirrors this crate's other mio registries: the accept
//! socket and the cancellation waker always occupy the first two tokens,
//! session tokens start after them and map 1:1 to sessions in insertion
//! order.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::client::session::ClientSession;
use crate::error::Result;
use mio::Token;

pub const LISTENER_TOKEN: Token = Token(0);
pub const WAKER_TOKEN: Token = Token(1);
pub const SESSION_TOKEN_START: usize = 2;

#[derive(Default)]
struct Inner {
    sessions: BTreeMap<usize, ClientSession>,
    next_token: usize,
    epoch: u64,
}

/// Owns every live [`ClientSession`] keyed by its poll token, plus the
/// generation counter that governs when a failed session becomes eligible
/// for removal.
#[derive(Default)]
pub struct ClientList {
    inner: Mutex<Inner>,
    multicast_enabled: bool,
}

impl ClientList {
    pub fn new(multicast_enabled: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: BTreeMap::new(),
                next_token: SESSION_TOKEN_START,
                epoch: 0,
            }),
            multicast_enabled,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Bump the epoch, e.g. on analyzer restart: pre-restart sessions
    /// become eligible for removal once their inspector work drains.
    pub fn advance_epoch(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.epoch
    }

    /// Insert a freshly-accepted session, assigning it the next poll token.
    pub fn insert(&self, build: impl FnOnce(usize, u64) -> ClientSession) -> usize {
        let mut inner = self.inner.lock();
        let token = inner.next_token;
        inner.next_token += 1;
        let epoch = inner.epoch;
        let session = build(token, epoch);
        inner.sessions.insert(token, session);
        token
    }

    pub fn with_session<R>(&self, token: usize, f: impl FnOnce(&mut ClientSession) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        inner.sessions.get_mut(&token).map(f)
    }

    /// Remove every session that is `Failed` and either epoch-stale or has
    /// no outstanding inspector work.
    pub fn sweep_failed(&self) -> Vec<usize> {
        let mut inner = self.inner.lock();
        let epoch = inner.epoch;
        let mut removed = Vec::new();
        inner.sessions.retain(|token, session| {
            let eligible = session.is_failed() && (session.epoch != epoch || !session.has_outstanding_inspectors());
            if eligible {
                removed.push(*token);
            }
            !eligible
        });
        removed
    }

    pub fn tokens(&self) -> Vec<usize> {
        self.inner.lock().sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Broadcast a serialized PDU payload to every authenticated client,
    /// skipping clients that opted into multicast when multicast delivery
    /// is active for this list. `on_error` is invoked (with the session
    /// token) for any per-client write failure; it typically marks that
    /// client failed.
    pub fn broadcast(&self, payload: &[u8], mut on_error: impl FnMut(usize)) {
        let inner = self.inner.lock();
        for (token, session) in inner.sessions.iter() {
            if self.multicast_enabled && session.accepts_multicast {
                continue;
            }
            if let Err(_e) = session.tx.enqueue(payload.to_vec()) {
                on_error(*token);
            }
        }
    }

    /// Unicast to exactly one session, bypassing the multicast skip.
    pub fn send_to(&self, token: usize, payload: Vec<u8>) -> Option<Result<()>> {
        let inner = self.inner.lock();
        inner.sessions.get(&token).map(|s| s.tx.enqueue(payload))
    }

    /// Shut every session down hard; used when the analyzer halts.
    pub fn force_shutdown(&self) {
        let mut inner = self.inner.lock();
        for session in inner.sessions.values_mut() {
            session.kick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream as StdTcpStream};

    fn fake_session(token: usize, epoch: u64) -> ClientSession {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = StdTcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        let (_join, tx) = crate::tx_worker::TxWorker::spawn(server_side, crate::codec::PduCodec::default()).unwrap();
        ClientSession::new(token, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000), tx, epoch)
    }

    #[test]
    fn tokens_start_after_reserved_slots() {
        let list = ClientList::new(false);
        let token = list.insert(fake_session);
        assert!(token >= SESSION_TOKEN_START);
    }

    #[test]
    fn sweep_removes_failed_sessions_with_no_outstanding_work() {
        let list = ClientList::new(false);
        let token = list.insert(fake_session);
        list.with_session(token, |s| s.kick());
        let removed = list.sweep_failed();
        assert_eq!(removed, vec![token]);
        assert!(list.is_empty());
    }

    #[test]
    fn sweep_keeps_failed_session_with_outstanding_inspectors_at_current_epoch() {
        let list = ClientList::new(false);
        let token = list.insert(fake_session);
        list.with_session(token, |s| {
            s.allocate_handle(1, 0).unwrap();
            s.kick();
        });
        let removed = list.sweep_failed();
        assert!(removed.is_empty());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn epoch_stale_session_is_swept_even_with_outstanding_inspectors() {
        let list = ClientList::new(false);
        let token = list.insert(fake_session);
        list.with_session(token, |s| {
            s.allocate_handle(1, 0).unwrap();
            s.kick();
        });
        list.advance_epoch();
        let removed = list.sweep_failed();
        assert_eq!(removed, vec![token]);
    }
}
