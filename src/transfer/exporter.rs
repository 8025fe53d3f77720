//! Tenant exporter
//!
//! Walks the repository graph, writes one CSV per table and pivot into the
//! job workspace, and packages them into a single zip archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::archive::{self, csv_file_name};
use super::error::{PortabilityError, Result};
use super::graph::RepositoryGraph;
use super::job::{ExportJob, ExportReport};
use super::schema::{ID_COLUMN, RepositoryModel};
use super::store::{CsvRow, RowFilter, TableStore};

/// Rows fetched per query while writing a table CSV.
pub const EXPORT_PAGE_SIZE: u64 = 500;

/// A CSV written into the job workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFile {
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// What an export should contain.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub tenant_id: String,
    pub organization_id: Option<String>,
    /// Restrict to these tables (plus their pivots). `None` exports everything.
    pub tables: Option<Vec<String>>,
    /// Header-only CSVs for every selected table.
    pub template: bool,
}

#[derive(Clone)]
pub struct Exporter {
    graph: Arc<RepositoryGraph>,
    store: TableStore,
    work_dir: PathBuf,
}

impl Exporter {
    pub fn new(db: DatabaseConnection, graph: Arc<RepositoryGraph>, work_dir: PathBuf) -> Self {
        Self {
            graph,
            store: TableStore::new(db),
            work_dir,
        }
    }

    /// Fresh workspace keyed by a random job id.
    pub fn create_workspace(&self, cancel: CancellationToken) -> Result<ExportJob> {
        let job = ExportJob::create(&self.work_dir, cancel)?;
        debug!(job_id = %job.job_id, dir = %job.working_dir().display(), "Export workspace created");
        Ok(job)
    }

    /// Writes the table's visible rows. No file is produced for zero rows.
    pub async fn export_table(
        &self,
        job: &ExportJob,
        model: &RepositoryModel,
        tenant_id: &str,
        organization_id: Option<&str>,
    ) -> Result<Option<CsvFile>> {
        let filter = RowFilter {
            tenant_id: tenant_id.to_string(),
            organization_id: organization_id.map(str::to_string),
        };
        let mut page = self
            .store
            .fetch_rows(model, &filter, None, EXPORT_PAGE_SIZE)
            .await?;
        if page.is_empty() {
            debug!(table = %model.table_name, "No rows, skipping CSV");
            return Ok(None);
        }

        let path = job.csv_dir().join(csv_file_name(&model.table_name));
        let mut sink = CsvSink::create(&path, &model.column_names()).await?;
        let mut rows = 0;
        loop {
            job.ensure_active()?;
            sink.write_rows(&page).await?;
            rows += page.len();
            if (page.len() as u64) < EXPORT_PAGE_SIZE {
                break;
            }
            let last = page
                .last()
                .and_then(|row| row.get(ID_COLUMN).cloned().flatten());
            page = self
                .store
                .fetch_rows(model, &filter, last.as_deref(), EXPORT_PAGE_SIZE)
                .await?;
            if page.is_empty() {
                break;
            }
        }
        sink.finish().await?;

        counter!("portability_rows_exported_total", "table" => model.table_name.clone())
            .increment(rows as u64);
        debug!(table = %model.table_name, rows, "Table exported");
        Ok(Some(CsvFile {
            name: model.table_name.clone(),
            path,
            rows,
        }))
    }

    /// Writes one CSV per pivot owned by `model`, restricted to the tenant's owning rows.
    pub async fn export_pivot_rows(
        &self,
        job: &ExportJob,
        model: &RepositoryModel,
        tenant_id: &str,
    ) -> Result<Vec<CsvFile>> {
        let mut written = Vec::new();
        for pivot in &model.many_to_many {
            let rows = self.store.fetch_pivot_rows(model, pivot, tenant_id).await?;
            if rows.is_empty() {
                continue;
            }
            let path = job.csv_dir().join(csv_file_name(&pivot.pivot_table));
            let mut sink = CsvSink::create(&path, &pivot.columns()).await?;
            sink.write_rows(&rows).await?;
            sink.finish().await?;
            counter!("portability_rows_exported_total", "table" => pivot.pivot_table.clone())
                .increment(rows.len() as u64);
            written.push(CsvFile {
                name: pivot.pivot_table.clone(),
                path,
                rows: rows.len(),
            });
        }
        Ok(written)
    }

    /// Header-only CSVs for the table and each of its pivots.
    pub async fn export_schema_only(
        &self,
        job: &ExportJob,
        model: &RepositoryModel,
    ) -> Result<Vec<CsvFile>> {
        let mut written = Vec::with_capacity(1 + model.many_to_many.len());

        let path = job.csv_dir().join(csv_file_name(&model.table_name));
        CsvSink::create(&path, &model.column_names()).await?.finish().await?;
        written.push(CsvFile {
            name: model.table_name.clone(),
            path,
            rows: 0,
        });

        for pivot in &model.many_to_many {
            let path = job.csv_dir().join(csv_file_name(&pivot.pivot_table));
            CsvSink::create(&path, &pivot.columns()).await?.finish().await?;
            written.push(CsvFile {
                name: pivot.pivot_table.clone(),
                path,
                rows: 0,
            });
        }
        Ok(written)
    }

    /// Compresses the job's CSV directory into its archive path.
    pub async fn archive(&self, job: &ExportJob) -> Result<PathBuf> {
        let csv_dir = job.csv_dir();
        let archive_path = job.archive_path();
        let target = archive_path.clone();
        let entries =
            tokio::task::spawn_blocking(move || archive::compress_dir(&csv_dir, &target)).await??;
        debug!(job_id = %job.job_id, entries, "Export archived");
        Ok(archive_path)
    }

    /// Streams the archive into `sink`, then removes the workspace.
    pub async fn deliver<W>(&self, job: ExportJob, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut file = tokio::fs::File::open(job.archive_path()).await?;
        let bytes = tokio::io::copy(&mut file, sink).await?;
        sink.flush().await?;
        drop(file);
        info!(job_id = %job.job_id, bytes, "Export delivered");
        drop(job);
        Ok(bytes)
    }

    /// Runs a whole export and returns the job with its archive ready for delivery.
    ///
    /// Any failure drops the job, which removes the workspace and partial files.
    #[instrument(skip(self, request, cancel), fields(tenant_id = %request.tenant_id, template = request.template))]
    pub async fn run(
        &self,
        request: &ExportRequest,
        cancel: CancellationToken,
    ) -> Result<(ExportJob, ExportReport)> {
        let started = Instant::now();
        let job = self.create_workspace(cancel)?;
        let mut report = ExportReport {
            job_id: job.job_id,
            ..ExportReport::default()
        };

        let models: Vec<&RepositoryModel> = match &request.tables {
            Some(names) => self
                .graph
                .select(names.as_slice())
                .map_err(PortabilityError::UnknownTable)?,
            None => self.graph.ordered().iter().collect(),
        };

        for model in models {
            job.ensure_active()?;

            if request.template {
                let mut files = self.export_schema_only(&job, model).await?.into_iter();
                report.tables.extend(files.next().map(|f| f.name));
                report.pivots.extend(files.map(|f| f.name));
                continue;
            }

            if let Some(file) = self
                .export_table(
                    &job,
                    model,
                    &request.tenant_id,
                    request.organization_id.as_deref(),
                )
                .await?
            {
                report.rows += file.rows as u64;
                report.tables.push(file.name);
            }

            for file in self.export_pivot_rows(&job, model, &request.tenant_id).await? {
                report.rows += file.rows as u64;
                report.pivots.push(file.name);
            }
        }

        job.ensure_active()?;
        self.archive(&job).await?;

        histogram!("portability_job_duration_seconds", "kind" => "export")
            .record(started.elapsed().as_secs_f64());
        info!(
            job_id = %job.job_id,
            tables = report.tables.len(),
            pivots = report.pivots.len(),
            rows = report.rows,
            "Export finished"
        );
        Ok((job, report))
    }
}

/// Appends CSV records to a file, flushing after every batch.
struct CsvSink {
    file: tokio::fs::File,
    header: Vec<String>,
    buffer: csv::Writer<Vec<u8>>,
}

impl CsvSink {
    async fn create(path: &Path, header: &[&str]) -> Result<Self> {
        let file = tokio::fs::File::create(path).await?;
        let mut buffer = csv::Writer::from_writer(Vec::new());
        buffer.write_record(header)?;
        Ok(Self {
            file,
            header: header.iter().map(|h| h.to_string()).collect(),
            buffer,
        })
    }

    async fn write_rows(&mut self, rows: &[CsvRow]) -> Result<()> {
        for row in rows {
            self.buffer.write_record(
                self.header
                    .iter()
                    .map(|column| row.get(column).and_then(|v| v.as_deref()).unwrap_or("")),
            )?;
        }
        self.drain().await
    }

    async fn drain(&mut self) -> Result<()> {
        self.buffer.flush()?;
        let bytes = std::mem::replace(&mut self.buffer, csv::Writer::from_writer(Vec::new()))
            .into_inner()
            .map_err(|e| e.into_error())?;
        self.file.write_all(&bytes).await?;
        Ok(())
    }

    async fn finish(mut self) -> Result<()> {
        self.drain().await?;
        self.file.flush().await?;
        Ok(())
    }
}
