// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast fragmentation and reassembly: the wire layout shared by every
//! superframe type ([`fragment`]), the two known sub-processors
//! ([`encap`], [`psd`]), and the dispatcher that routes fragments between
//! them by superframe id ([`processor`]).

pub mod encap;
pub mod fragment;
pub mod processor;
pub mod psd;

pub use fragment::{rollover_delta, FragmentHeader, SuperframeType};
pub use processor::{MulticastEvent, MulticastProcessor};
pub use psd::{PsdFrame, PsdHeader};
