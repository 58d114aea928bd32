// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outer multicast RX dispatcher: tracks the currently active superframe
//! type/id and routes fragments to the matching sub-processor.

use crate::multicast::encap::EncapReassembler;
use crate::multicast::fragment::{rollover_delta, FragmentHeader, SuperframeType};
use crate::multicast::psd::PsdFrame;
use crate::wire::RemoteCall;

/// Output of the multicast pipeline: either a reassembled remote call
/// (`encap`) or a reassembled PSD frame (`psd`).
#[derive(Debug, Clone, PartialEq)]
pub enum MulticastEvent {
    Call(RemoteCall),
    Psd(PsdFrame),
}

/// Which sub-processor, if any, currently owns the active superframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveKind {
    None,
    Encap,
    Psd,
}

/// Stateful dispatcher owning one reassembler per registered superframe
/// type. `sf_type == announce` is special-cased and never reaches either
/// reassembler.
#[derive(Debug)]
pub struct MulticastProcessor {
    encap: EncapReassembler,
    psd: PsdReassemblerSlot,
    active: ActiveKind,
    curr_id: u8,
    first: bool,
}

/// `PsdReassembler` isn't `Copy`/`Default`-free of allocations, so it gets
/// its own tiny wrapper to keep `MulticastProcessor::new` trivial.
type PsdReassemblerSlot = crate::multicast::psd::PsdReassembler;

impl Default for MulticastProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MulticastProcessor {
    pub fn new() -> Self {
        Self {
            encap: EncapReassembler::new(),
            psd: PsdReassemblerSlot::new(),
            active: ActiveKind::None,
            curr_id: 0,
            first: true,
        }
    }

    /// Ask the currently active sub-processor to attempt a best-effort
    /// flush. `encap` only yields a call when complete; `psd` yields
    /// whenever at least one update has arrived since the last flush.
    pub fn trigger_on_call(&mut self) -> Option<MulticastEvent> {
        match self.active {
            ActiveKind::None => None,
            ActiveKind::Encap => self.encap.try_flush().map(MulticastEvent::Call),
            ActiveKind::Psd => self.psd.try_flush().map(MulticastEvent::Psd),
        }
    }

    /// Parse and dispatch one raw multicast datagram.
    ///
    /// Returns any event produced as a side effect of a refresh-boundary
    /// flush triggered by this fragment. The fragment's own contribution
    /// never completes synchronously here for `encap` — callers that want
    /// to know as soon as a call completes should call `trigger_on_call`
    /// after every `process`, mirroring the reference processor leaving
    /// that decision to `on_fragment`.
    pub fn process(&mut self, datagram: &[u8]) -> Option<MulticastEvent> {
        let (header, payload) = match FragmentHeader::parse(datagram) {
            Ok(parsed) => parsed,
            Err(_) => return None,
        };

        // Announces are recognized and dropped before any bookkeeping runs.
        if header.sf_type == SuperframeType::Announce {
            return None;
        }

        let delta = rollover_delta(self.curr_id, header.sf_id);
        if delta < 0 {
            log::debug!("multicast: stale sf_id {} (curr {}), dropping", header.sf_id, self.curr_id);
            return None;
        }

        let mut flushed = None;
        if delta > 1 || self.first {
            if self.active != ActiveKind::None {
                flushed = self.trigger_on_call();
            }
            match header.sf_type {
                SuperframeType::Encap => self.active = ActiveKind::Encap,
                SuperframeType::Psd => self.active = ActiveKind::Psd,
                SuperframeType::Unknown(code) => {
                    log::warn!("multicast: unknown superframe type {code}");
                    self.active = ActiveKind::None;
                    self.curr_id = header.sf_id;
                    self.first = false;
                    return flushed;
                }
                SuperframeType::Announce => unreachable!("announces return above"),
            }
            self.curr_id = header.sf_id;
        } else if self.active == ActiveKind::None {
            // Mid-stream fragment for a type we already gave up on; the
            // warning already fired at the refresh boundary.
            return flushed;
        }
        self.first = false;

        // We do not trigger on_call here; on_fragment decides that for encap,
        // and psd is flushed lazily via trigger_on_call.
        match self.active {
            ActiveKind::Encap => {
                self.encap.on_fragment(&header, payload);
            }
            ActiveKind::Psd => {
                self.psd.on_fragment(&header, payload);
            }
            ActiveKind::None => {}
        }
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encap_fragment(sf_id: u8, full_size: u32, offset: u32, payload: &[u8]) -> Vec<u8> {
        FragmentHeader::encode(SuperframeType::Encap, sf_id, full_size, offset, payload)
    }

    #[test]
    fn announce_fragments_never_affect_state() {
        let mut proc = MulticastProcessor::new();
        let announce = FragmentHeader::encode(SuperframeType::Announce, 200, 0, 0, b"");
        assert!(proc.process(&announce).is_none());
        assert_eq!(proc.curr_id, 0);
        assert!(proc.first);
    }

    #[test]
    fn full_encap_call_flushes_on_trigger() {
        let call = RemoteCall::RequestHalt;
        let bytes = call.serialize();
        let mut proc = MulticastProcessor::new();
        proc.process(&encap_fragment(1, bytes.len() as u32, 0, &bytes));
        let event = proc.trigger_on_call();
        assert_eq!(event, Some(MulticastEvent::Call(call)));
    }

    #[test]
    fn rollover_flush_on_id_jump_drops_incomplete_payload() {
        let mut proc = MulticastProcessor::new();
        // id A, incomplete (sf_size bigger than what we send)
        proc.process(&encap_fragment(10, 100, 0, &[0u8; 20]));
        // id A+2: forces a refresh-boundary flush attempt (incomplete -> None)
        let bytes = RemoteCall::ForceEos.serialize();
        let flushed = proc.process(&encap_fragment(12, bytes.len() as u32, 0, &bytes));
        assert!(flushed.is_none());
        let event = proc.trigger_on_call();
        assert_eq!(event, Some(MulticastEvent::Call(RemoteCall::ForceEos)));
    }

    #[test]
    fn unknown_type_on_refresh_boundary_is_dropped_and_remembered() {
        let mut proc = MulticastProcessor::new();
        let datagram = FragmentHeader::encode(SuperframeType::Unknown(99), 5, 10, 0, b"x");
        assert!(proc.process(&datagram).is_none());
        assert_eq!(proc.curr_id, 5);
        // Same id again, mid-stream: dropped without re-resolving.
        let datagram2 = FragmentHeader::encode(SuperframeType::Unknown(99), 5, 10, 0, b"y");
        assert!(proc.process(&datagram2).is_none());
    }

    #[test]
    fn stale_id_is_dropped() {
        let mut proc = MulticastProcessor::new();
        let bytes = RemoteCall::ForceEos.serialize();
        proc.process(&encap_fragment(50, bytes.len() as u32, 0, &bytes));
        proc.trigger_on_call();
        let result = proc.process(&encap_fragment(10, bytes.len() as u32, 0, &bytes));
        assert!(result.is_none());
        assert_eq!(proc.curr_id, 50);
    }
}
