// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Domain-tagged error type shared by every subsystem, plus an aggregator for
//! paths (`Close`, `put_many`) that can fail in more than one place at once.

use std::fmt;

use cid::Cid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cid {0} not found")]
    NotFound(Cid),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("backend I/O error: {0}")]
    BackendIo(String),

    #[error("corrupt block {cid}: {reason}")]
    Corruption { cid: Cid, reason: String },

    #[error("failed to decode varint: {0}")]
    Codec(String),

    #[error("splitstore is shutting down")]
    ShuttingDown,

    #[error("failed to mark {cid} as protected: {reason}")]
    ProtectionMark { cid: Cid, reason: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn backend_io(err: impl fmt::Display) -> Self {
        Error::BackendIo(err.to_string())
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::BackendIo(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Aggregates errors from operations that fan out across several backends
/// (`Close`, `put_many`), so every sub-store's failure is reported rather
/// than only the first.
#[derive(Debug, Default)]
pub struct ErrorList(pub Vec<Error>);

impl ErrorList {
    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    pub fn into_result(self) -> std::result::Result<(), ErrorList> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred", self.0.len())?;
        for (i, e) in self.0.iter().enumerate() {
            write!(f, "; [{i}] {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
