// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Faults from the world outside the state machine: storage, decoding,
/// configuration. Domain precondition failures are `Rejection`s instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("blob store unavailable for {namespace}: {reason}")]
    Store { namespace: String, reason: String },
}
