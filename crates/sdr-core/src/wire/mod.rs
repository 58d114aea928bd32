// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire-level types: the remote-call tagged union and its binary codec.

pub mod call;
pub mod cursor;

pub use call::{AnalyzerMessage, AnalyzerMsgType, ClientAuth, RemoteCall, ServerHello, SourceInfo};
