// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{OpenGate, PatchGate, PresidingGate, PublisherId, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Per-client session settings. The namespace is the session's address on
/// the transport: two clients share a session iff they share a namespace,
/// and switching namespace starts from an empty session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub namespace: String,
    pub topic: String,
    pub publisher: PublisherId,
    /// Where the replica persists its snapshot for offline resume.
    pub snapshot_path: Option<PathBuf>,
    /// Directory of the file blob store, when that backend is used.
    pub blob_dir: Option<PathBuf>,
    /// Publishers trusted to chair. Empty means remote writes are not
    /// screened at all.
    pub presiding_publishers: Vec<PublisherId>,
    /// Default tracing filter, overridden by `RUST_LOG`.
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            namespace: "hemicycle".to_string(),
            topic: "session".to_string(),
            publisher: PublisherId::new("anonymous"),
            snapshot_path: None,
            blob_dir: None,
            presiding_publishers: Vec::new(),
            log_filter: "hemicycle=info".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        SessionConfig::from_toml_str(&text)
    }

    pub fn gate(&self) -> Box<dyn PatchGate + Send> {
        if self.presiding_publishers.is_empty() {
            Box::new(OpenGate)
        } else {
            Box::new(PresidingGate::new(self.presiding_publishers.iter().cloned()))
        }
    }

    /// Installs a global fmt subscriber. Returns false if one was already
    /// installed.
    pub fn init_tracing(&self) -> bool {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_filter));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    }
}
