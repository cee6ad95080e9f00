//! Interaction log
//!
//! Append-only, human-readable audit trail of user-facing events. The core
//! never reads it back; a failed write is logged and otherwise ignored.

use crate::types::Intervention;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interaction {
    WindowOpened,
    WindowClosed,
    ResourceOpened {
        path: String,
    },
    InterventionSet {
        active: String,
        associated: String,
        intervention: Intervention,
    },
    InterventionSwitched {
        active: String,
        associated: String,
        from: Intervention,
        to: Intervention,
    },
}

impl Interaction {
    /// Events the recommendation consumer may report directly
    pub fn is_client_event(&self) -> bool {
        matches!(
            self,
            Interaction::WindowOpened | Interaction::WindowClosed | Interaction::ResourceOpened { .. }
        )
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interaction::WindowOpened => write!(f, "window opened"),
            Interaction::WindowClosed => write!(f, "window closed"),
            Interaction::ResourceOpened { path } => write!(f, "resource opened: {}", path),
            Interaction::InterventionSet {
                active,
                associated,
                intervention,
            } => write!(f, "set {}: {} <-> {}", intervention, active, associated),
            Interaction::InterventionSwitched {
                active,
                associated,
                from,
                to,
            } => write!(f, "switched {} -> {}: {} <-> {}", from, to, active, associated),
        }
    }
}

pub struct InteractionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl InteractionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an interaction stamped with the current time
    pub fn record(&self, interaction: &Interaction) {
        self.record_at(interaction, Utc::now());
    }

    pub fn record_at(&self, interaction: &Interaction, at: DateTime<Utc>) {
        if let Err(e) = self.append(interaction, at) {
            warn!("Failed to write interaction log {:?}: {}", self.path, e);
        }
    }

    fn append(&self, interaction: &Interaction, at: DateTime<Utc>) -> std::io::Result<()> {
        let line = format!(
            "{} {}\n",
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
            interaction
        );

        // Poisoning only means another writer panicked mid-append
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}
