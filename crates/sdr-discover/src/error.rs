// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! This binary's own thin error type, wrapping the library's.

#[derive(thiserror::Error, Debug)]
pub enum DiscoverError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to install ctrl-c handler: {0}")]
    CtrlC(#[from] ctrlc::Error),

    #[error(transparent)]
    Core(#[from] sdr_core::Error),
}
