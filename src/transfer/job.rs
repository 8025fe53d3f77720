//! Per-job state for exports and imports.
//!
//! Each job owns a temporary workspace under the configured work directory.
//! Dropping the job removes the workspace, so every exit path cleans up.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use super::archive::CSV_DIR;
use super::error::{PortabilityError, Result};

fn workspace(base: &Path, kind: &str, job_id: Uuid) -> Result<TempDir> {
    std::fs::create_dir_all(base)?;
    Ok(tempfile::Builder::new()
        .prefix(&format!("{kind}-{job_id}-"))
        .tempdir_in(base)?)
}

/// An export in progress.
#[derive(Debug)]
pub struct ExportJob {
    pub job_id: Uuid,
    workspace: TempDir,
    pub cancel: CancellationToken,
}

impl ExportJob {
    pub fn create(base: &Path, cancel: CancellationToken) -> Result<Self> {
        let job_id = Uuid::new_v4();
        let workspace = workspace(base, "export", job_id)?;
        std::fs::create_dir_all(workspace.path().join(CSV_DIR))?;
        Ok(Self {
            job_id,
            workspace,
            cancel,
        })
    }

    pub fn working_dir(&self) -> &Path {
        self.workspace.path()
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.workspace.path().join(CSV_DIR)
    }

    /// `<job id>_export.zip`
    pub fn archive_file_name(&self) -> String {
        format!("{}_export.zip", self.job_id)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.workspace.path().join(self.archive_file_name())
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PortabilityError::Cancelled {
                job_id: self.job_id,
            });
        }
        Ok(())
    }
}

/// Whether existing tenant data is purged before importing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportMode {
    Clean,
    Merge,
}

impl ImportMode {
    pub fn is_clean(&self) -> bool {
        matches!(self, ImportMode::Clean)
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImportMode::Clean => "CLEAN",
            ImportMode::Merge => "MERGE",
        })
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CLEAN" => Ok(ImportMode::Clean),
            "MERGE" => Ok(ImportMode::Merge),
            other => Err(format!("unknown import type '{other}', expected CLEAN or MERGE")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Extracting,
    Cleaning,
    Importing,
    ImportingPivots,
    Done,
    Failed,
}

/// A reference written as NULL that is filled in after every table is imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredPatch {
    pub table: String,
    pub row_id: String,
    pub column: String,
    pub target_table: String,
    pub source_id: String,
}

/// What to import and for whom.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub tenant_id: String,
    pub mode: ImportMode,
    /// User to attach to every imported organization.
    pub user_id: Option<String>,
}

/// An import in progress.
#[derive(Debug)]
pub struct ImportJob {
    pub job_id: Uuid,
    workspace: TempDir,
    pub tenant_id: String,
    pub mode: ImportMode,
    pub user_id: Option<String>,
    pub state: ImportState,
    pub cancel: CancellationToken,
    pub pending: Vec<DeferredPatch>,
    /// Destination ids assigned by this job, keyed by (table, source id).
    translated: HashMap<(String, String), String>,
    pub report: ImportReport,
}

impl ImportJob {
    pub fn create(base: &Path, request: ImportRequest, cancel: CancellationToken) -> Result<Self> {
        let job_id = Uuid::new_v4();
        let workspace = workspace(base, "import", job_id)?;
        Ok(Self {
            job_id,
            workspace,
            tenant_id: request.tenant_id,
            mode: request.mode,
            user_id: request.user_id,
            state: ImportState::Extracting,
            cancel,
            pending: Vec::new(),
            translated: HashMap::new(),
            report: ImportReport::new(job_id, request.mode),
        })
    }

    pub fn extract_dir(&self) -> &Path {
        self.workspace.path()
    }

    pub fn remember(&mut self, table: &str, source_id: &str, destination_id: &str) {
        self.translated.insert(
            (table.to_string(), source_id.to_string()),
            destination_id.to_string(),
        );
    }

    /// Destination id this job assigned to the source row, if it got that far.
    pub fn translated(&self, table: &str, source_id: &str) -> Option<&str> {
        self.translated
            .get(&(table.to_string(), source_id.to_string()))
            .map(String::as_str)
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PortabilityError::Cancelled {
                job_id: self.job_id,
            });
        }
        Ok(())
    }
}

/// Summary of a finished export.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ExportReport {
    pub job_id: Uuid,
    /// Table CSVs written, in graph order.
    pub tables: Vec<String>,
    /// Pivot CSVs written.
    pub pivots: Vec<String>,
    /// Data rows across every file.
    pub rows: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TableReport {
    pub imported: u64,
    pub reused: u64,
    pub skipped: u64,
}

/// Summary of a finished import.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImportReport {
    pub job_id: Uuid,
    pub mode: ImportMode,
    pub tables: BTreeMap<String, TableReport>,
    /// Tables with no CSV in the archive.
    pub missing: Vec<String>,
    pub cleaned_rows: u64,
    pub pivots_inserted: u64,
    pub pivots_dropped: u64,
    pub patches_applied: u64,
    pub memberships_added: u64,
}

impl ImportReport {
    pub fn new(job_id: Uuid, mode: ImportMode) -> Self {
        Self {
            job_id,
            mode,
            tables: BTreeMap::new(),
            missing: Vec::new(),
            cleaned_rows: 0,
            pivots_inserted: 0,
            pivots_dropped: 0,
            patches_applied: 0,
            memberships_added: 0,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.get(name)
    }

    pub fn total_imported(&self) -> u64 {
        self.tables.values().map(|t| t.imported).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.tables.values().map(|t| t.skipped).sum()
    }
}
