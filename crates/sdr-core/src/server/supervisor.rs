// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The server supervisor: call handling, inspector-handle interception,
//! and the analyzer lifecycle (lazy start, halt-on-last-client-departure).
//!
//! The accept/RX loop that feeds [`Supervisor::handle_call`] and the caller
//! thread that drains [`Supervisor::try_recv_analyzer_event`] are expected
//! to run on their own OS threads per the concurrency model; this module is
//! deliberately poll-loop-agnostic so it can be driven by a real mio
//! accept loop or, in tests, by calling the methods directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::analyzer::{AnalyzerCommand, AnalyzerEvent, AnalyzerHandle};
use crate::client::ClientList;
use crate::error::{Error, Result};
use crate::server::itl::InspectorTable;
use crate::wire::{AnalyzerMessage, AnalyzerMsgType, ClientAuth, RemoteCall, SourceInfo};

/// Everything the supervisor needs to answer "is an analyzer live, and
/// should one be started or stopped now".
pub struct Supervisor {
    pub clients: Arc<ClientList>,
    pub inspectors: Arc<InspectorTable>,
    analyzer: parking_lot::Mutex<Option<AnalyzerHandle>>,
    server_name: String,
    expected_user: String,
    expected_password: String,
    analyzer_live: AtomicBool,
    analyzer_start_requested: AtomicBool,
}

impl Supervisor {
    pub fn new(
        clients: Arc<ClientList>,
        server_name: impl Into<String>,
        expected_user: impl Into<String>,
        expected_password: impl Into<String>,
    ) -> Self {
        Self {
            clients,
            inspectors: Arc::new(InspectorTable::new()),
            analyzer: parking_lot::Mutex::new(None),
            server_name: server_name.into(),
            expected_user: expected_user.into(),
            expected_password: expected_password.into(),
            analyzer_live: AtomicBool::new(false),
            analyzer_start_requested: AtomicBool::new(false),
        }
    }

    pub fn analyzer_is_live(&self) -> bool {
        self.analyzer_live.load(Ordering::Acquire)
    }

    /// Consume the "an authenticated client is waiting on an analyzer"
    /// signal raised by [`Supervisor::handle_auth_call`], for a caller
    /// driving lazy analyzer construction from its own thread. Returns
    /// `true` at most once per request.
    pub fn take_start_request(&self) -> bool {
        self.analyzer_start_requested.swap(false, Ordering::AcqRel)
    }

    /// Pull at most one pending event off the live analyzer's output queue,
    /// for a caller driving [`Supervisor::handle_analyzer_event`] from its
    /// own thread rather than the accept loop. Returns `None` with no
    /// analyzer installed or nothing pending.
    pub fn try_recv_analyzer_event(&self) -> Option<AnalyzerEvent> {
        self.analyzer.lock().as_ref()?.events.try_recv().ok()
    }

    /// Install the analyzer handle on first successful auth. The actual
    /// spawning of the DSP engine behind `handle` is out of scope here; the
    /// caller constructs it (or a stub) and hands the channel ends over.
    pub fn start_analyzer(&self, handle: AnalyzerHandle) {
        *self.analyzer.lock() = Some(handle);
        self.analyzer_live.store(true, Ordering::Release);
    }

    /// Halt the analyzer: drop the handle, bump the list epoch so
    /// pre-halt sessions become eligible for removal once their inspector
    /// work drains.
    pub fn halt_analyzer(&self) {
        *self.analyzer.lock() = None;
        self.analyzer_live.store(false, Ordering::Release);
        self.clients.advance_epoch();
    }

    fn dispatch(&self, command: AnalyzerCommand) -> Result<()> {
        let guard = self.analyzer.lock();
        match guard.as_ref() {
            Some(handle) => handle.dispatch(command).map_err(|_| Error::NotFound("analyzer")),
            None => Err(Error::NotFound("analyzer")),
        }
    }

    /// Handle one inbound call from `token`'s session, already authenticated
    /// or not per the session's own state.
    pub fn handle_call(&self, token: usize, call: RemoteCall) -> Result<()> {
        let authenticated = self
            .clients
            .with_session(token, |s| s.state == crate::client::SessionState::Authenticated)
            .unwrap_or(false);

        if !authenticated {
            return self.handle_auth_call(token, call);
        }

        let call = self.intercept_outbound_to_analyzer(token, call)?;
        if let Some(command) = AnalyzerCommand::from_remote_call(call) {
            if matches!(command, AnalyzerCommand::Halt) {
                self.halt_analyzer();
                return Ok(());
            }
            self.dispatch(command)?;
        }
        Ok(())
    }

    fn handle_auth_call(&self, token: usize, call: RemoteCall) -> Result<()> {
        let RemoteCall::ClientAuth(auth) = call else {
            return Err(Error::MalformedPdu);
        };
        let ok = self
            .clients
            .with_session(token, |s| s.authenticate(&auth, &self.expected_user, &self.expected_password))
            .unwrap_or(false);

        if !ok {
            self.clients.with_session(token, |s| {
                let _ = s.tx.enqueue(RemoteCall::AuthRejected.serialize());
                s.kick();
            });
            return Ok(());
        }

        if !self.analyzer_is_live() {
            // Lazy start is the caller's responsibility (it owns the
            // concrete analyzer construction); record the intent so a
            // caller polling `take_start_request` knows to start one.
            self.analyzer_start_requested.store(true, Ordering::Release);
            log::debug!("supervisor: first authenticated client, analyzer should be started");
        }

        self.clients.with_session(token, |s| {
            let _ = s.tx.enqueue(RemoteCall::SourceInfo(SourceInfo::default()).serialize());
        });
        Ok(())
    }

    /// Apply the inspector interception rules for a post-auth call headed
    /// to the analyzer, rewriting identifiers as it goes.
    fn intercept_outbound_to_analyzer(&self, token: usize, call: RemoteCall) -> Result<RemoteCall> {
        let RemoteCall::AnalyzerMessage(mut msg) = call else {
            return Ok(call);
        };

        match msg.msg_type {
            AnalyzerMsgType::Open => {
                msg.req_id = token as u32;
                self.clients.with_session(token, |s| s.open_pending());
            }
            _ => {
                // Every subsequent inspector-scoped message carries the
                // client's private handle; rewrite to the analyzer's global
                // handle before forwarding.
                if let Some(entry) = self.clients.with_session(token, |s| s.lookup_handle(msg.handle)).flatten() {
                    msg.handle = entry.global_handle;
                } else {
                    return Err(Error::NotFound("inspector handle"));
                }
            }
        }
        Ok(RemoteCall::AnalyzerMessage(msg))
    }

    /// Drain one analyzer event, applying per-client rewrites and either
    /// targeting a specific client or broadcasting. Returns `false` once a
    /// halt sentinel has been observed.
    pub fn handle_analyzer_event(&self, event: AnalyzerEvent) -> bool {
        match event {
            AnalyzerEvent::Halted => {
                self.clients.force_shutdown();
                self.halt_analyzer();
                false
            }
            AnalyzerEvent::SourceInfo(info) => {
                let payload = RemoteCall::SourceInfo(info).serialize();
                self.clients.broadcast(&payload, |token| {
                    self.clients.with_session(token, |s| s.mark_failed());
                });
                true
            }
            AnalyzerEvent::Inspector(msg) => {
                self.route_inspector_event(msg);
                true
            }
        }
    }

    fn route_inspector_event(&self, mut msg: AnalyzerMessage) {
        match msg.msg_type {
            AnalyzerMsgType::OpenResponse => {
                let token = msg.req_id as usize;
                let global_handle = msg.handle;
                let itl_index = match self.inspectors.allocate(token, global_handle) {
                    Ok(idx) => idx,
                    Err(e) => {
                        log::warn!("supervisor: failed to allocate inspector slot: {e}");
                        return;
                    }
                };
                let private = self
                    .clients
                    .with_session(token, |s| s.allocate_handle(global_handle, itl_index));
                match private {
                    Some(Ok(private_handle)) => {
                        msg.handle = private_handle;
                        self.clients.with_session(token, |s| s.open_resolved());
                        self.send_to_client(token, RemoteCall::AnalyzerMessage(msg));
                    }
                    _ => {
                        self.inspectors.free(itl_index);
                    }
                }
            }
            AnalyzerMsgType::SetId => {
                // `handle` here carries the itl_index the Open/OpenResponse
                // pair just established; the payload carries the analyzer's
                // numeric inspector id.
                let itl_index = msg.handle;
                let id = u32::from_be_bytes(msg.payload.get(0..4).map(|b| b.try_into().unwrap()).unwrap_or([0; 4]));
                self.inspectors.set_id(itl_index, id);
                if let Some(entry) = self.inspectors.get(itl_index) {
                    let mut rewritten = msg.clone();
                    rewritten.handle = itl_index;
                    self.send_to_client(entry.owning_client, RemoteCall::AnalyzerMessage(rewritten));
                }
            }
            AnalyzerMsgType::Close | AnalyzerMsgType::InvalidChannel => {
                if let Some(entry) = self.inspectors.free(msg.handle) {
                    self.clients.with_session(entry.owning_client, |s| {
                        s.remove_handle(entry.server_private_handle);
                        s.open_resolved();
                    });
                }
            }
            AnalyzerMsgType::WrongHandle => {
                // Synthesize a response directly back to the offending
                // client without touching the analyzer further.
                let token = msg.req_id as usize;
                self.send_to_client(token, RemoteCall::AnalyzerMessage(msg));
            }
            AnalyzerMsgType::Open | AnalyzerMsgType::Data | AnalyzerMsgType::Other(_) => {
                if let Some(entry) = self.inspectors.get(msg.handle) {
                    let mut rewritten = msg.clone();
                    rewritten.handle = entry.server_private_handle;
                    self.send_to_client(entry.owning_client, RemoteCall::AnalyzerMessage(rewritten));
                }
            }
        }
    }

    fn send_to_client(&self, token: usize, call: RemoteCall) {
        let payload = call.serialize();
        if let Some(Err(_)) = self.clients.send_to(token, payload) {
            self.clients.with_session(token, |s| s.mark_failed());
        }
    }

    /// Shut the socket down, synthesize `Close` for every live handle so
    /// the analyzer cleans up, then mark the session failed.
    pub fn kick_client(&self, token: usize) {
        let slots = self.inspectors.slots_for_client(token);
        for (itl_index, entry) in slots {
            let close = AnalyzerMessage {
                msg_type: AnalyzerMsgType::Close,
                handle: entry.server_private_handle,
                req_id: 0,
                payload: Vec::new(),
            };
            let _ = self.dispatch(AnalyzerCommand::Inspector(close));
            self.inspectors.free(itl_index);
        }
        self.clients.with_session(token, |s| s.kick());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream as StdTcpStream};
    use std::sync::mpsc::channel;

    fn fake_session(token: usize, epoch: u64) -> crate::client::ClientSession {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = StdTcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        let (_join, tx) = crate::tx_worker::TxWorker::spawn(server_side, crate::codec::PduCodec::default()).unwrap();
        crate::client::ClientSession::new(token, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9001), tx, epoch)
    }

    fn supervisor_with_client() -> (Supervisor, usize) {
        let clients = Arc::new(ClientList::new(false));
        let token = clients.insert(fake_session);
        clients.with_session(token, |s| {
            s.send_hello("test", crate::config::AUTH_MODE_USER_PASSWORD, None).unwrap();
        });
        let supervisor = Supervisor::new(clients, "test", "alice", "secret");
        (supervisor, token)
    }

    #[test]
    fn wrong_password_rejects_and_kicks() {
        let (supervisor, token) = supervisor_with_client();
        let salt = supervisor.clients.with_session(token, |s| s.user().is_none()).unwrap();
        assert!(salt);
        let auth = ClientAuth {
            client_name: "c".to_string(),
            protocol_major: 0,
            protocol_minor: 1,
            user: "alice".to_string(),
            sha256_token: [0u8; 32],
            flags: 0,
        };
        supervisor.handle_call(token, RemoteCall::ClientAuth(auth)).unwrap();
        let failed = supervisor.clients.with_session(token, |s| s.is_failed()).unwrap();
        assert!(failed);
    }

    #[test]
    fn wrong_claimed_user_rejects_even_with_right_password() {
        let (supervisor, token) = supervisor_with_client();
        let salt = supervisor.clients.with_session(token, |s| s.salt_for_test()).unwrap();
        let token_hash = crate::auth::compute_auth_token("mallory", "secret", &salt);
        let auth = ClientAuth {
            client_name: "c".to_string(),
            protocol_major: 0,
            protocol_minor: 1,
            user: "mallory".to_string(),
            sha256_token: token_hash,
            flags: 0,
        };
        supervisor.handle_call(token, RemoteCall::ClientAuth(auth)).unwrap();
        let failed = supervisor.clients.with_session(token, |s| s.is_failed()).unwrap();
        assert!(failed);
    }

    #[test]
    fn open_response_allocates_a_private_handle_and_forwards_it() {
        let (supervisor, token) = supervisor_with_client();
        let (_cmd_tx, cmd_rx) = channel();
        let (event_tx, event_rx) = channel();
        supervisor.start_analyzer(AnalyzerHandle::new(_cmd_tx, event_rx));

        let open_response = AnalyzerMessage {
            msg_type: AnalyzerMsgType::OpenResponse,
            handle: 555,
            req_id: token as u32,
            payload: Vec::new(),
        };
        event_tx.send(AnalyzerEvent::Inspector(open_response)).unwrap();
        let event = supervisor.analyzer.lock().as_ref().unwrap().events.try_recv().unwrap();
        assert!(supervisor.handle_analyzer_event(event));

        let has_inspector = supervisor.clients.with_session(token, |s| s.has_outstanding_inspectors()).unwrap();
        assert!(has_inspector);
    }

    #[test]
    fn successful_auth_raises_a_one_shot_start_request() {
        let (supervisor, token) = supervisor_with_client();
        assert!(!supervisor.take_start_request());

        let salt = supervisor.clients.with_session(token, |s| s.salt_for_test()).unwrap();
        let auth = ClientAuth {
            client_name: "c".to_string(),
            protocol_major: 0,
            protocol_minor: 1,
            user: "alice".to_string(),
            sha256_token: crate::auth::compute_auth_token("alice", "secret", &salt),
            flags: 0,
        };
        supervisor.handle_call(token, RemoteCall::ClientAuth(auth)).unwrap();

        assert!(supervisor.take_start_request());
        // Consumed: a second poll before the next auth sees nothing new.
        assert!(!supervisor.take_start_request());
    }

    #[test]
    fn kick_client_frees_every_inspector_slot_it_owned() {
        let (supervisor, token) = supervisor_with_client();
        let itl_index = supervisor.inspectors.allocate(token, 99).unwrap();
        supervisor.clients.with_session(token, |s| {
            s.allocate_handle(99, itl_index).unwrap();
        });
        supervisor.kick_client(token);
        assert!(supervisor.inspectors.slots_for_client(token).is_empty());
    }
}
