use anyhow::anyhow;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{IngestError, IngestResult};
use crate::grouper::{RecordGroup, group_records};
use crate::headers::AliasTables;
use crate::materializer::HoldingMaterializer;
use crate::models::{
    ImportFormat, ImportRunSummary, ImportStatus, NewImportRun, ParseErrorKind, RowError, RunOutcome,
    RunUpdate,
};
use crate::parser;
use crate::resolver::IdentityResolver;
use crate::store::{ClientDirectory, HoldingStore, ImportRunStore, SchemeDirectory};

/// The collaborators one `Ingestor` works against.
#[derive(Clone)]
pub struct Stores {
    pub clients: Arc<dyn ClientDirectory>,
    pub schemes: Arc<dyn SchemeDirectory>,
    pub holdings: Arc<dyn HoldingStore>,
    pub runs: Arc<dyn ImportRunStore>,
}

impl Stores {
    /// Uses one backend for every collaborator.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ClientDirectory + SchemeDirectory + HoldingStore + ImportRunStore + 'static,
    {
        Self {
            clients: store.clone(),
            schemes: store.clone(),
            holdings: store.clone(),
            runs: store,
        }
    }
}

/// An uploaded export file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub size: u64,
    pub content: String,
}

impl Upload {
    /// Invalid UTF-8 sequences are replaced rather than rejected.
    pub fn from_bytes(file_name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            size: bytes.len() as u64,
            content: String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn text(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            file_name: file_name.into(),
            size: content.len() as u64,
            content,
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    imported_clients: usize,
    imported_holdings: usize,
    skipped_records: usize,
    errors: Vec<RowError>,
}

pub struct Ingestor {
    aliases: Arc<AliasTables>,
    resolver: IdentityResolver,
    materializer: HoldingMaterializer,
    runs: Arc<dyn ImportRunStore>,
}

impl Ingestor {
    pub fn new(stores: Stores, aliases: Arc<AliasTables>, placeholder_domain: &str) -> Self {
        Self::with_resolver(
            IdentityResolver::new(stores.clients, stores.schemes, placeholder_domain),
            HoldingMaterializer::new(stores.holdings),
            stores.runs,
            aliases,
        )
    }

    pub fn with_resolver(
        resolver: IdentityResolver,
        materializer: HoldingMaterializer,
        runs: Arc<dyn ImportRunStore>,
        aliases: Arc<AliasTables>,
    ) -> Self {
        Self {
            aliases,
            resolver,
            materializer,
            runs,
        }
    }

    /// Parses, resolves and persists one export file. Per-row and per-group
    /// failures end up in the run's error list; anything else marks the run
    /// FAILED and is returned as `IngestError::RunFailed`.
    pub async fn ingest(
        &self,
        advisor_id: &str,
        format: ImportFormat,
        upload: Upload,
    ) -> IngestResult<ImportRunSummary> {
        let outcome = parser::parse(format, &upload.content, &self.aliases);

        let run = self
            .runs
            .create_import_run(&NewImportRun {
                advisor_id: advisor_id.to_string(),
                format,
                file_name: upload.file_name.clone(),
                file_size: upload.size,
                total_records: outcome.records.len(),
            })
            .await?;
        info!(
            "Import {} started: {} {} ({} records, {} parse errors)",
            run.id,
            format,
            upload.file_name,
            outcome.records.len(),
            outcome.errors.len()
        );

        let rejected_rows = outcome
            .errors
            .iter()
            .filter(|e| e.row > 0 && e.kind.rejects_row())
            .count();
        let mut tally = self.process_groups(advisor_id, group_records(outcome.records)).await;
        tally.skipped_records += rejected_rows;

        let mut errors = outcome.errors;
        errors.append(&mut tally.errors);
        let status = ImportStatus::derive(errors.len(), tally.imported_clients);

        let finished = RunOutcome {
            status,
            imported_clients: tally.imported_clients,
            imported_holdings: tally.imported_holdings,
            skipped_records: tally.skipped_records,
            errors,
        };

        match self.finish(&run.id, advisor_id, finished).await {
            Ok(summary) => {
                info!(
                    "Import {} finished {}: {} clients, {} holdings, {} skipped, {} errors",
                    summary.id,
                    summary.status,
                    summary.imported_clients,
                    summary.imported_holdings,
                    summary.skipped_records,
                    summary.error_records
                );
                Ok(summary)
            }
            Err(cause) => {
                error!("Import {} failed: {}", run.id, cause);
                let abort = RunUpdate::Aborted(RowError::file_level(
                    "",
                    cause.to_string(),
                    ParseErrorKind::RunFailed,
                ));
                if let Err(e) = self.runs.update_import_run(&run.id, &abort).await {
                    error!("Could not mark import {} as failed: {}", run.id, e);
                }
                Err(IngestError::RunFailed {
                    run_id: run.id,
                    cause,
                })
            }
        }
    }

    async fn finish(
        &self,
        run_id: &str,
        advisor_id: &str,
        outcome: RunOutcome,
    ) -> anyhow::Result<ImportRunSummary> {
        self.runs
            .update_import_run(run_id, &RunUpdate::Finished(outcome))
            .await?;
        let run = self
            .runs
            .find_import_run(run_id, advisor_id)
            .await?
            .ok_or_else(|| anyhow!("Import {} vanished after update", run_id))?;
        Ok(ImportRunSummary::from(&run))
    }

    async fn process_groups(&self, advisor_id: &str, groups: Vec<RecordGroup>) -> Tally {
        let mut tally = Tally::default();

        for group in groups {
            let client = match self.resolver.resolve_client(advisor_id, &group).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!("Client {} failed, skipping {} rows: {}", group.key, group.len(), e);
                    tally.errors.push(RowError::new(
                        group.first_row(),
                        "client",
                        format!("Failed to import client {}: {}", group.key, e),
                        ParseErrorKind::ClientFailed,
                    ));
                    tally.skipped_records += group.len();
                    continue;
                }
            };
            if client.created {
                tally.imported_clients += 1;
            }

            for record in &group.records {
                let written = match self.resolver.resolve_scheme(record).await {
                    Ok(scheme) => self.materializer.materialize(&client.client.id, record, scheme).await,
                    Err(e) => Err(e),
                };
                match written {
                    Ok(_) => tally.imported_holdings += 1,
                    Err(e) => {
                        warn!("Row {}: holding for {} failed: {}", record.row(), record.scheme_name(), e);
                        tally.errors.push(RowError::new(
                            record.row(),
                            "holding",
                            format!("Failed to import holding for {}: {}", record.scheme_name(), e),
                            ParseErrorKind::HoldingFailed,
                        ));
                        tally.skipped_records += 1;
                    }
                }
            }
        }
        tally
    }

    pub async fn get_status(&self, run_id: &str, advisor_id: &str) -> IngestResult<ImportRunSummary> {
        let run = self
            .runs
            .find_import_run(run_id, advisor_id)
            .await?
            .ok_or_else(|| IngestError::not_found(run_id))?;
        Ok(ImportRunSummary::from(&run))
    }

    pub async fn get_errors(&self, run_id: &str, advisor_id: &str) -> IngestResult<Vec<RowError>> {
        let run = self
            .runs
            .find_import_run(run_id, advisor_id)
            .await?
            .ok_or_else(|| IngestError::not_found(run_id))?;
        Ok(run.errors)
    }

    pub async fn get_history(&self, advisor_id: &str) -> IngestResult<Vec<ImportRunSummary>> {
        let runs = self.runs.list_import_runs(advisor_id).await?;
        Ok(runs.iter().map(ImportRunSummary::from).collect())
    }
}
