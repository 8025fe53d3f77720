//! Tenant importer
//!
//! Replays an exported archive into a destination tenant. Every identifier is
//! regenerated; references are rewritten through the translation store.
//! CSVs are read one record at a time on a blocking thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DbErr};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::archive;
use super::error::{Result, RowError};
use super::graph::RepositoryGraph;
use super::job::{DeferredPatch, ImportJob, ImportRequest, ImportState, TableReport};
use super::schema::{
    ColumnKind, ID_COLUMN, ORGANIZATION_COLUMN, ORGANIZATION_TABLE, RepositoryModel,
    TENANT_COLUMN, TenantScope, USER_ORGANIZATION_TABLE,
};
use super::store::{Assignments, Cell, CsvRow, TableStore, coerce};
use super::translation::TranslationStore;
use crate::error::is_unique_violation;

/// Result of importing one CSV row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted(String),
    Reused(String),
}

impl RowOutcome {
    pub fn destination_id(&self) -> &str {
        match self {
            RowOutcome::Inserted(id) | RowOutcome::Reused(id) => id,
        }
    }
}

#[derive(Clone)]
pub struct Importer {
    graph: Arc<RepositoryGraph>,
    store: TableStore,
    translations: TranslationStore,
    work_dir: PathBuf,
}

impl Importer {
    pub fn new(db: DatabaseConnection, graph: Arc<RepositoryGraph>, work_dir: PathBuf) -> Self {
        Self {
            graph,
            store: TableStore::new(db.clone()),
            translations: TranslationStore::new(db),
            work_dir,
        }
    }

    pub fn translations(&self) -> &TranslationStore {
        &self.translations
    }

    /// Unpacks the archive into a fresh job workspace.
    pub async fn extract(
        &self,
        archive_path: &Path,
        request: ImportRequest,
        cancel: CancellationToken,
    ) -> Result<ImportJob> {
        let job = ImportJob::create(&self.work_dir, request, cancel)?;
        let source = archive_path.to_path_buf();
        let dest = job.extract_dir().to_path_buf();
        tokio::task::spawn_blocking(move || archive::extract(&source, &dest)).await??;
        debug!(job_id = %job.job_id, dir = %job.extract_dir().display(), "Archive extracted");
        Ok(job)
    }

    /// Deletes the tenant's existing rows of a non-static tenant table.
    pub async fn clean(&self, job: &ImportJob, model: &RepositoryModel) -> Result<u64> {
        if !job.mode.is_clean() || model.is_static || !model.is_tenant_based() {
            return Ok(0);
        }
        let deleted = self
            .store
            .delete_tenant_rows(&model.table_name, &job.tenant_id)
            .await?;
        debug!(table = %model.table_name, deleted, "Tenant rows removed");
        Ok(deleted)
    }

    /// Imports every row of the table's CSV. Row failures are logged and skipped.
    pub async fn import_table(&self, job: &mut ImportJob, model: &RepositoryModel) -> Result<TableReport> {
        let mut report = TableReport::default();
        let Some(path) = archive::locate_csv(job.extract_dir(), &model.table_name) else {
            debug!(table = %model.table_name, "No CSV in archive, skipping");
            job.report.missing.push(model.table_name.clone());
            return Ok(report);
        };

        let mut rows = CsvRows::open(&path);
        let mut line = 1;
        while let Some(row) = rows.next().await {
            line += 1;
            job.ensure_active()?;

            let outcome = match row {
                Ok(row) => self.import_row(job, model, &row).await,
                Err(err) => Err(err),
            };

            match outcome {
                Ok(RowOutcome::Inserted(_)) => report.imported += 1,
                Ok(RowOutcome::Reused(_)) => report.reused += 1,
                Err(err) => {
                    report.skipped += 1;
                    counter!("portability_rows_skipped_total", "table" => model.table_name.clone())
                        .increment(1);
                    warn!(
                        job_id = %job.job_id,
                        table = %model.table_name,
                        line,
                        error = %err,
                        "Skipping row"
                    );
                }
            }
        }
        rows.finish().await?;

        counter!("portability_rows_imported_total", "table" => model.table_name.clone())
            .increment(report.imported);
        debug!(
            table = %model.table_name,
            imported = report.imported,
            reused = report.reused,
            skipped = report.skipped,
            "Table imported"
        );
        job.report
            .tables
            .insert(model.table_name.clone(), report.clone());
        Ok(report)
    }

    /// Rewrites one row for the destination tenant and inserts or reuses it.
    pub async fn import_row(
        &self,
        job: &mut ImportJob,
        model: &RepositoryModel,
        row: &CsvRow,
    ) -> std::result::Result<RowOutcome, RowError> {
        let source_id = row
            .get(ID_COLUMN)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(RowError::MissingId)?
            .to_string();

        if model.scope == TenantScope::Root {
            let tenant_id = job.tenant_id.clone();
            self.translations
                .record(&tenant_id, &model.table_name, &source_id, &tenant_id)
                .await?;
            job.remember(&model.table_name, &source_id, &tenant_id);
            return Ok(RowOutcome::Reused(tenant_id));
        }

        let mut values: Assignments = Vec::with_capacity(model.columns.len());
        let mut deferred = Vec::new();

        for column in &model.columns {
            if column.name == ID_COLUMN {
                continue;
            }
            if !row.contains_key(&column.name) {
                if column.name == TENANT_COLUMN
                    && model.scope == TenantScope::Tenant
                    && !column.nullable
                {
                    values.push((column.name.clone(), Cell::Text(job.tenant_id.clone())));
                }
                continue;
            }
            let raw = row.get(&column.name).and_then(|v| v.as_deref());
            let mut cell = coerce(column, raw)?;

            if column.name == TENANT_COLUMN && model.is_tenant_based() {
                // NULL stays NULL: global defaults remain global.
                if !cell.is_null() {
                    cell = Cell::Text(job.tenant_id.clone());
                }
            } else if let Some(fk) = model.foreign_key(&column.name)
                && let Some(reference) = cell.as_text().map(str::to_string)
            {
                let deferrable = self.graph.is_deferred(&model.table_name, &column.name);
                let resolved = if deferrable {
                    // Rows from earlier imports may be gone; wait for the second pass.
                    job.translated(&fk.target_table, &reference).map(str::to_string)
                } else if fk.column == ORGANIZATION_COLUMN && fk.target_table == ORGANIZATION_TABLE {
                    self.resolve_organization(job, &reference).await?
                } else {
                    self.resolve(job, &fk.target_table, &reference).await?
                };

                cell = match resolved {
                    Some(destination) => Cell::Text(destination),
                    None if deferrable => {
                        deferred.push((column.name.clone(), fk.target_table.clone(), reference));
                        Cell::Null(column.kind)
                    }
                    None if column.nullable => {
                        debug!(
                            table = %model.table_name,
                            column = %column.name,
                            source_id = %reference,
                            "Reference was never imported, writing NULL"
                        );
                        Cell::Null(column.kind)
                    }
                    None => {
                        return Err(RowError::UnresolvedReference {
                            column: column.name.clone(),
                            target: fk.target_table.clone(),
                            source_id: reference,
                        });
                    }
                };
            }

            if cell.is_null() && !column.nullable {
                return Err(RowError::MissingValue {
                    column: column.name.clone(),
                });
            }
            values.push((column.name.clone(), cell));
        }

        let outcome = match self.find_existing(model, &values).await? {
            Some(existing) => RowOutcome::Reused(existing),
            None => {
                let destination_id = Uuid::new_v4().to_string();
                values.insert(0, (ID_COLUMN.to_string(), Cell::Text(destination_id.clone())));
                self.store.insert_row(&model.table_name, values).await?;
                RowOutcome::Inserted(destination_id)
            }
        };

        self.translations
            .record(
                &job.tenant_id,
                &model.table_name,
                &source_id,
                outcome.destination_id(),
            )
            .await?;
        job.remember(&model.table_name, &source_id, outcome.destination_id());

        if let RowOutcome::Inserted(row_id) = &outcome {
            job.pending
                .extend(deferred.into_iter().map(|(column, target_table, source_id)| DeferredPatch {
                    table: model.table_name.clone(),
                    row_id: row_id.clone(),
                    column,
                    target_table,
                    source_id,
                }));
        }

        Ok(outcome)
    }

    /// Destination id of a source row: this job's own assignment first, then a
    /// stored translation whose row still exists.
    pub async fn resolve(
        &self,
        job: &ImportJob,
        table: &str,
        source_id: &str,
    ) -> std::result::Result<Option<String>, DbErr> {
        if let Some(destination) = job.translated(table, source_id) {
            return Ok(Some(destination.to_string()));
        }
        let Some(destination) = self
            .translations
            .lookup(&job.tenant_id, table, source_id)
            .await?
        else {
            return Ok(None);
        };

        let conditions = [(ID_COLUMN.to_string(), Cell::Text(destination.clone()))];
        if self.store.exists(table, &conditions).await? {
            return Ok(Some(destination));
        }
        debug!(table, source_id, destination = %destination, "Stored translation is stale");
        Ok(None)
    }

    /// Organization references are kept when the organization already exists in
    /// the destination tenant, otherwise translated.
    async fn resolve_organization(
        &self,
        job: &ImportJob,
        source_id: &str,
    ) -> std::result::Result<Option<String>, DbErr> {
        if self.graph.contains(ORGANIZATION_TABLE) {
            let conditions = [
                (ID_COLUMN.to_string(), Cell::Text(source_id.to_string())),
                (TENANT_COLUMN.to_string(), Cell::Text(job.tenant_id.clone())),
            ];
            if self.store.exists(ORGANIZATION_TABLE, &conditions).await? {
                return Ok(Some(source_id.to_string()));
            }
        }
        self.resolve(job, ORGANIZATION_TABLE, source_id).await
    }

    async fn find_existing(
        &self,
        model: &RepositoryModel,
        values: &Assignments,
    ) -> std::result::Result<Option<String>, RowError> {
        if model.unique_identifiers.is_empty() {
            return Ok(None);
        }

        let mut conditions = Vec::with_capacity(model.unique_identifiers.len() + 1);
        if model.is_tenant_based() {
            let tenant = values
                .iter()
                .find(|(name, _)| name == TENANT_COLUMN)
                .map(|(_, cell)| cell.clone())
                .unwrap_or(Cell::Null(ColumnKind::Text));
            conditions.push((TENANT_COLUMN.to_string(), tenant));
        }
        for unique in &model.unique_identifiers {
            let Some((_, cell)) = values.iter().find(|(name, _)| name == &unique.column) else {
                // Without every unique column the row cannot be matched.
                return Ok(None);
            };
            conditions.push((unique.column.clone(), cell.clone()));
        }

        Ok(self.store.find_id(&model.table_name, &conditions).await?)
    }

    /// Fills in deferred references now that every table has been imported.
    pub async fn apply_deferred_patches(&self, job: &mut ImportJob) -> Result<u64> {
        let patches = std::mem::take(&mut job.pending);
        let mut applied = 0;
        for patch in patches {
            job.ensure_active()?;
            let Some(destination) = self
                .resolve(job, &patch.target_table, &patch.source_id)
                .await?
            else {
                debug!(
                    table = %patch.table,
                    column = %patch.column,
                    source_id = %patch.source_id,
                    "Deferred reference has no translation, leaving NULL"
                );
                continue;
            };
            applied += self
                .store
                .update_column(&patch.table, &patch.row_id, &patch.column, Cell::Text(destination))
                .await?;
        }
        job.report.patches_applied += applied;
        Ok(applied)
    }

    /// Replays the pivots owned by `model`; rows with an untranslated endpoint are dropped.
    pub async fn import_pivot_rows(&self, job: &mut ImportJob, model: &RepositoryModel) -> Result<(u64, u64)> {
        let mut inserted = 0;
        let mut dropped = 0;

        for pivot in &model.many_to_many {
            let Some(path) = archive::locate_csv(job.extract_dir(), &pivot.pivot_table) else {
                continue;
            };

            let mut rows = CsvRows::open(&path);
            while let Some(row) = rows.next().await {
                job.ensure_active()?;
                let Ok(row) = row else {
                    dropped += 1;
                    continue;
                };

                let local = row.get(&pivot.join_column).and_then(|v| v.as_deref());
                let foreign = row.get(&pivot.inverse_join_column).and_then(|v| v.as_deref());
                let (Some(local), Some(foreign)) = (local, foreign) else {
                    dropped += 1;
                    continue;
                };

                let local_id = self.resolve(job, &model.table_name, local).await?;
                let foreign_id = self.resolve(job, &pivot.target_table, foreign).await?;
                let (Some(local_id), Some(foreign_id)) = (local_id, foreign_id) else {
                    debug!(
                        pivot = %pivot.pivot_table,
                        local,
                        foreign,
                        "Pivot endpoint was never imported, dropping row"
                    );
                    dropped += 1;
                    continue;
                };

                let values = vec![
                    (pivot.join_column.clone(), Cell::Text(local_id)),
                    (pivot.inverse_join_column.clone(), Cell::Text(foreign_id)),
                ];
                if self.store.exists(&pivot.pivot_table, &values).await? {
                    continue;
                }
                match self.store.insert_row(&pivot.pivot_table, values).await {
                    Ok(()) => inserted += 1,
                    Err(err) if is_unique_violation(&err) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            rows.finish().await?;
        }

        counter!("portability_pivot_rows_dropped_total", "table" => model.table_name.clone())
            .increment(dropped);
        job.report.pivots_inserted += inserted;
        job.report.pivots_dropped += dropped;
        Ok((inserted, dropped))
    }

    /// Makes the importing user a member of every organization in the archive.
    pub async fn reattach_importing_user(&self, job: &mut ImportJob, user_id: &str) -> Result<u64> {
        let Some(memberships) = self.graph.get(USER_ORGANIZATION_TABLE) else {
            return Ok(0);
        };
        if let Some(fk) = memberships.foreign_key("user_id") {
            let user = [(ID_COLUMN.to_string(), Cell::Text(user_id.to_string()))];
            if !self.store.exists(&fk.target_table, &user).await? {
                warn!(job_id = %job.job_id, user_id, "Importing user not found, no memberships added");
                return Ok(0);
            }
        }
        let Some(path) = archive::locate_csv(job.extract_dir(), ORGANIZATION_TABLE) else {
            return Ok(0);
        };

        let mut added = 0;
        let mut rows = CsvRows::open(&path);
        while let Some(row) = rows.next().await {
            let Ok(row) = row else {
                continue;
            };
            let Some(source_id) = row.get(ID_COLUMN).and_then(|v| v.as_deref()) else {
                continue;
            };
            let Some(organization_id) = self.resolve(job, ORGANIZATION_TABLE, source_id).await? else {
                continue;
            };

            let membership = vec![
                (TENANT_COLUMN.to_string(), Cell::Text(job.tenant_id.clone())),
                (ORGANIZATION_COLUMN.to_string(), Cell::Text(organization_id)),
                ("user_id".to_string(), Cell::Text(user_id.to_string())),
            ];
            if self
                .store
                .exists(USER_ORGANIZATION_TABLE, &membership)
                .await?
            {
                continue;
            }

            let mut values = membership;
            values.insert(0, (ID_COLUMN.to_string(), Cell::Text(Uuid::new_v4().to_string())));
            values.push(("is_active".to_string(), Cell::Boolean(true)));
            self.store.insert_row(USER_ORGANIZATION_TABLE, values).await?;
            added += 1;
        }
        rows.finish().await?;

        job.report.memberships_added += added;
        Ok(added)
    }

    /// Removes the extraction directory.
    pub fn cleanup(&self, job: ImportJob) {
        debug!(job_id = %job.job_id, "Import workspace removed");
        drop(job);
    }

    /// Runs a whole import. The workspace is removed whatever the outcome.
    #[instrument(skip(self, archive_path, request, cancel), fields(tenant_id = %request.tenant_id, mode = %request.mode))]
    pub async fn run(
        &self,
        archive_path: &Path,
        request: ImportRequest,
        cancel: CancellationToken,
    ) -> Result<super::job::ImportReport> {
        let started = Instant::now();
        let mut job = self.extract(archive_path, request, cancel).await?;

        let outcome = self.process(&mut job).await;
        job.state = if outcome.is_ok() {
            ImportState::Done
        } else {
            ImportState::Failed
        };
        histogram!("portability_job_duration_seconds", "kind" => "import")
            .record(started.elapsed().as_secs_f64());

        let report = job.report.clone();
        match &outcome {
            Ok(()) => info!(
                job_id = %job.job_id,
                imported = report.total_imported(),
                skipped = report.total_skipped(),
                pivots = report.pivots_inserted,
                dropped = report.pivots_dropped,
                patches = report.patches_applied,
                "Import finished"
            ),
            Err(err) => warn!(job_id = %job.job_id, error = %err, "Import failed"),
        }
        self.cleanup(job);
        outcome.map(|()| report)
    }

    async fn process(&self, job: &mut ImportJob) -> Result<()> {
        let graph = Arc::clone(&self.graph);

        if job.mode.is_clean() {
            self.transition(job, ImportState::Cleaning);
            for model in graph.ordered().iter().rev() {
                job.ensure_active()?;
                if archive::locate_csv(job.extract_dir(), &model.table_name).is_none() {
                    continue;
                }
                let cleaned = self.clean(job, model).await?;
                job.report.cleaned_rows += cleaned;
            }
        }

        self.transition(job, ImportState::Importing);
        for model in graph.ordered() {
            job.ensure_active()?;
            self.import_table(job, model).await?;
        }
        self.apply_deferred_patches(job).await?;

        self.transition(job, ImportState::ImportingPivots);
        for model in graph.ordered() {
            job.ensure_active()?;
            self.import_pivot_rows(job, model).await?;
        }

        if let Some(user_id) = job.user_id.clone() {
            self.reattach_importing_user(job, &user_id).await?;
        }
        Ok(())
    }

    fn transition(&self, job: &mut ImportJob, state: ImportState) {
        debug!(job_id = %job.job_id, from = ?job.state, to = ?state, "Import state change");
        job.state = state;
    }
}

type ParsedRow = std::result::Result<CsvRow, RowError>;

/// Rows buffered between the reader thread and the importer.
const CSV_BUFFER: usize = 256;

/// Header-keyed rows streamed from a CSV file. Malformed records come back as
/// row errors; a file that cannot be read at all fails in [`CsvRows::finish`].
struct CsvRows {
    rows: mpsc::Receiver<ParsedRow>,
    reader: JoinHandle<Result<()>>,
}

impl CsvRows {
    fn open(path: &Path) -> Self {
        let (sender, rows) = mpsc::channel(CSV_BUFFER);
        let path = path.to_path_buf();
        let reader = tokio::task::spawn_blocking(move || stream_csv(&path, &sender));
        Self { rows, reader }
    }

    async fn next(&mut self) -> Option<ParsedRow> {
        self.rows.recv().await
    }

    async fn finish(self) -> Result<()> {
        drop(self.rows);
        self.reader.await?
    }
}

/// Stops early once the receiving side is dropped.
fn stream_csv(path: &Path, sender: &mpsc::Sender<ParsedRow>) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut record = csv::StringRecord::new();
    loop {
        let row = match reader.read_record(&mut record) {
            Ok(false) => return Ok(()),
            Ok(true) => Ok(headers
                .iter()
                .zip(record.iter())
                .map(|(name, value)| (name.clone(), Some(value.to_string())))
                .collect()),
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => Err(RowError::from(err)),
        };
        if sender.blocking_send(row).is_err() {
            return Ok(());
        }
    }
}
