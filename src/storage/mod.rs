//! Persistence layer.
//!
//! The ledger lives in a CSV table (one row per record, see [`schema`]) with
//! a small JSON side file holding the profit target. Legacy tables written
//! before the schema marker existed are migrated on load; the next save
//! writes the current layout.

pub mod schema;
pub mod table;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::types::LedgerSnapshot;
use table::{StagedFile, TableRows};

/// Contents of the JSON side file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerMeta {
    pub schema_version: u32,
    pub profit_target: Decimal,
    pub saved_at: DateTime<Utc>,
}

/// File-backed ledger store.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    data_file: PathBuf,
    meta_file: PathBuf,
    backup_dir: PathBuf,
    /// Used when no side file exists yet.
    default_target: Decimal,
    /// Credited to the first row of a migrated legacy table that has no
    /// deposit column.
    legacy_initial_capital: Decimal,
}

impl LedgerStore {
    pub fn new(
        data_file: impl Into<PathBuf>,
        meta_file: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        default_target: Decimal,
    ) -> Self {
        Self {
            data_file: data_file.into(),
            meta_file: meta_file.into(),
            backup_dir: backup_dir.into(),
            default_target,
            legacy_initial_capital: Decimal::ZERO,
        }
    }

    pub fn from_config(cfg: &LedgerConfig) -> Self {
        Self::new(
            &cfg.data_file,
            &cfg.meta_file,
            &cfg.backup_dir,
            cfg.profit_target,
        )
        .with_legacy_initial_capital(cfg.legacy_initial_capital)
    }

    pub fn with_legacy_initial_capital(mut self, amount: Decimal) -> Self {
        self.legacy_initial_capital = amount;
        self
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn meta_file(&self) -> &Path {
        &self.meta_file
    }

    /// Load the saved ledger.
    /// Returns None if there is no table yet (fresh start).
    pub fn load(&self) -> Result<Option<LedgerSnapshot>> {
        if !self.data_file.exists() {
            info!(path = %self.data_file.display(), "No saved ledger found, starting fresh");
            return Ok(None);
        }

        let meta = self.load_meta()?;
        if let Some(m) = &meta {
            if m.schema_version > schema::CURRENT_VERSION {
                bail!(
                    "{} was written by a newer version (schema {})",
                    self.meta_file.display(),
                    m.schema_version
                );
            }
        }
        let profit_target = meta
            .as_ref()
            .map(|m| m.profit_target)
            .unwrap_or(self.default_target);

        let rows = table::read_table(&self.data_file)?;
        debug!(path = %self.data_file.display(), schema = ?rows.version(), "Ledger table read");
        let records = match rows {
            TableRows::Current(records) => records,
            TableRows::Legacy(legacy) => {
                let credited = if legacy.has_top_ups {
                    Decimal::ZERO
                } else {
                    self.legacy_initial_capital
                };
                let records = schema::migrate_v1(legacy, self.legacy_initial_capital)
                    .with_context(|| format!("Failed to migrate {}", self.data_file.display()))?;
                warn!(
                    path = %self.data_file.display(),
                    rows = records.len(),
                    initial_capital = %credited,
                    "Migrated legacy ledger table, next save writes schema {}",
                    schema::CURRENT_VERSION
                );
                records
            }
        };

        info!(
            path = %self.data_file.display(),
            rows = records.len(),
            profit_target = %profit_target,
            "Ledger loaded from disk"
        );

        Ok(Some(LedgerSnapshot {
            records,
            profit_target,
        }))
    }

    /// Write the table and side file.
    ///
    /// Both files are written to temp paths first and only renamed into
    /// place once both writes succeeded.
    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let text = table::render_table(&snapshot.records).context("Failed to render ledger table")?;
        let meta = LedgerMeta {
            schema_version: schema::CURRENT_VERSION,
            profit_target: snapshot.profit_target,
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&meta).context("Failed to serialise ledger meta")?;

        let staged_table = StagedFile::write(&self.data_file, text.as_bytes())?;
        let staged_meta = match StagedFile::write(&self.meta_file, json.as_bytes()) {
            Ok(staged) => staged,
            Err(e) => {
                staged_table.discard();
                return Err(e);
            }
        };
        staged_table.commit()?;
        staged_meta.commit()?;

        debug!(
            path = %self.data_file.display(),
            rows = snapshot.records.len(),
            "Ledger saved"
        );
        Ok(())
    }

    /// Copy the table into the backup directory and return the new path.
    pub fn backup(&self) -> Result<PathBuf> {
        if !self.data_file.exists() {
            bail!("Nothing to back up: {} does not exist", self.data_file.display());
        }
        fs::create_dir_all(&self.backup_dir).with_context(|| {
            format!("Failed to create backup directory {}", self.backup_dir.display())
        })?;

        let stem = self
            .data_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let target = self.backup_dir.join(format!("{stem}.backup_{stamp}.csv"));

        fs::copy(&self.data_file, &target).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                self.data_file.display(),
                target.display()
            )
        })?;

        info!(path = %target.display(), "Ledger backed up");
        Ok(target)
    }

    /// Remove the table and side file (for testing or reset).
    pub fn delete(&self) -> Result<()> {
        for path in [&self.data_file, &self.meta_file] {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to delete {}", path.display()))?;
            }
        }
        Ok(())
    }

    fn load_meta(&self) -> Result<Option<LedgerMeta>> {
        if !self.meta_file.exists() {
            debug!(path = %self.meta_file.display(), "No ledger meta file, using configured target");
            return Ok(None);
        }
        let json = fs::read_to_string(&self.meta_file)
            .with_context(|| format!("Failed to read {}", self.meta_file.display()))?;
        let meta: LedgerMeta = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", self.meta_file.display()))?;
        Ok(Some(meta))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
