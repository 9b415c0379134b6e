//! Durable record of the last successful backup date.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StateData {
    last_backup: Option<NaiveDate>,
}

/// Owned and mutated exclusively by the backup orchestrator. A missing or
/// corrupt state file means "no prior backup", never a startup failure.
pub struct RetentionState {
    path: PathBuf,
    data: StateData,
}

impl RetentionState {
    pub fn load(path: PathBuf) -> Self {
        let data = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(err) => {
                    warn!(
                        "ignoring corrupt backup state {}: {err}",
                        path.display()
                    );
                    StateData::default()
                }
            },
            Err(_) => StateData::default(),
        };

        Self { path, data }
    }

    pub fn last_backup(&self) -> Option<NaiveDate> {
        self.data.last_backup
    }

    /// Persists `date` as the last successful backup. Not reached when the
    /// copy failed, so an unchanged state retries on the next eligible tick.
    pub fn record_backup(&mut self, date: NaiveDate) -> Result<()> {
        self.data.last_backup = Some(date);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory {}", parent.display())
            })?;
        }

        let serialized = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write backup state to {}", self.path.display()))
    }
}
