// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reassembler for `encap` superframes: an opaque, compressed `RemoteCall`
//! payload split across fragments and recombined with a per-byte bitmap so
//! that out-of-order, duplicate, or overlapping fragments still converge on
//! the most complete payload possible.

use crate::config::MAX_SUPERFRAME_SIZE;
use crate::multicast::fragment::FragmentHeader;
use crate::wire::RemoteCall;

/// State for one in-progress `encap` superframe.
#[derive(Debug, Default)]
pub struct EncapReassembler {
    data: Vec<u8>,
    /// One bit per byte of `data`, packed into 64-bit words.
    bitmap: Vec<u64>,
    full_size: usize,
    remaining: usize,
    sf_id: u8,
    has_id: bool,
}

impl EncapReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard any in-progress superframe, e.g. because a new `sf_id`
    /// preempted it.
    pub fn reset(&mut self) {
        self.data.clear();
        self.bitmap.clear();
        self.full_size = 0;
        self.remaining = 0;
        self.has_id = false;
    }

    fn allocate(&mut self, full_size: usize, sf_id: u8) -> bool {
        if full_size > MAX_SUPERFRAME_SIZE {
            log::warn!("encap: announced superframe size {full_size} for sf_id {sf_id} exceeds the 1 MiB ceiling");
            return false;
        }
        self.data = vec![0u8; full_size];
        self.bitmap = vec![0u64; full_size.div_ceil(64)];
        self.full_size = full_size;
        self.remaining = full_size;
        true
    }

    /// Feed one fragment belonging to the currently tracked superframe.
    ///
    /// Returns `true` if this fragment started a *new* superframe (size or
    /// id change from whatever was previously buffered). Any previously
    /// buffered, still-incomplete payload is silently dropped in that case —
    /// only the outer dispatcher's refresh-boundary flush gets a chance at
    /// an explicit, best-effort `try_flush`.
    pub fn on_fragment(&mut self, header: &FragmentHeader, payload: &[u8]) -> bool {
        let full_size = header.sf_size as usize;
        let is_new = full_size != self.full_size || !self.has_id || header.sf_id != self.sf_id;
        if is_new {
            if !self.allocate(full_size, header.sf_id) {
                return is_new;
            }
            self.sf_id = header.sf_id;
            self.has_id = true;
        }

        let offset = header.sf_offset as usize;
        if offset + payload.len() > self.full_size {
            log::warn!(
                "encap: fragment offset {offset} + size {} exceeds full size {}, dropping",
                payload.len(),
                self.full_size
            );
            return is_new;
        }

        for (i, &byte) in payload.iter().enumerate() {
            let p = offset + i;
            let block = p >> 6;
            let bit = p & 0x3f;
            let mask = 1u64 << bit;
            if self.bitmap[block] & mask == 0 {
                self.data[p] = byte;
                self.bitmap[block] |= mask;
                self.remaining -= 1;
            }
        }

        is_new
    }

    /// Attempt to flush: only succeeds when every byte has been observed.
    pub fn try_flush(&mut self) -> Option<RemoteCall> {
        if self.full_size == 0 || self.remaining != 0 {
            return None;
        }
        let call = RemoteCall::deserialize(&self.data).ok();
        self.reset();
        call
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multicast::fragment::SuperframeType;

    fn fragment_at(full_size: u32, offset: u32, payload: &[u8]) -> (FragmentHeader, Vec<u8>) {
        let header = FragmentHeader {
            sf_type: SuperframeType::Encap,
            sf_id: 0,
            sf_size: full_size,
            sf_offset: offset,
            payload_len: payload.len() as u16,
        };
        (header, payload.to_vec())
    }

    #[test]
    fn reassembles_payload_with_duplicate_fragment() {
        let call = RemoteCall::SetFrequency {
            freq: 1_000_000.0,
            lnb: 0.0,
        };
        let serialized = call.serialize();
        let full_size = serialized.len() as u32;

        let mut reassembler = EncapReassembler::new();
        let chunk_size = 6usize.min(serialized.len());
        let mut calls_emitted = 0;
        for chunk_start in (0..serialized.len()).step_by(chunk_size) {
            let chunk_end = (chunk_start + chunk_size).min(serialized.len());
            let (header, payload) =
                fragment_at(full_size, chunk_start as u32, &serialized[chunk_start..chunk_end]);
            reassembler.on_fragment(&header, &payload);
        }
        // Resend the first fragment: must not double-count or break completion.
        let (header, payload) =
            fragment_at(full_size, 0, &serialized[0..chunk_size.min(serialized.len())]);
        reassembler.on_fragment(&header, &payload);

        if let Some(out) = reassembler.try_flush() {
            calls_emitted += 1;
            assert_eq!(out, call);
        }
        assert_eq!(calls_emitted, 1);
    }

    #[test]
    fn incomplete_superframe_does_not_flush() {
        let mut reassembler = EncapReassembler::new();
        let (header, payload) = fragment_at(100, 0, &[0u8; 50]);
        reassembler.on_fragment(&header, &payload);
        assert!(reassembler.try_flush().is_none());
    }

    #[test]
    fn oversized_superframe_is_rejected_without_panic() {
        let mut reassembler = EncapReassembler::new();
        let (header, payload) = fragment_at((MAX_SUPERFRAME_SIZE + 1) as u32, 0, &[0u8; 10]);
        reassembler.on_fragment(&header, &payload);
        assert!(reassembler.try_flush().is_none());
    }

    #[test]
    fn fragment_exceeding_full_size_is_dropped() {
        let mut reassembler = EncapReassembler::new();
        let (header, payload) = fragment_at(10, 5, &[0u8; 20]);
        reassembler.on_fragment(&header, &payload);
        assert!(reassembler.try_flush().is_none());
    }
}
