//! Collaborators the ingestion core talks to. Implementations must be
//! `Send + Sync` so one service instance can serve concurrent uploads.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    ClientSeed, Holding, HoldingInput, ImportRun, NewImportRun, ResolvedClient, RunUpdate, SchemeRef,
};

#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Finds the advisor's client by PAN, creating one from `seed` when none
    /// exists. Without a PAN a new client is always created. Creation must be
    /// an upsert on `(advisor, pan)` so two concurrent runs cannot duplicate it.
    async fn find_or_create_client(
        &self,
        advisor_id: &str,
        pan: Option<&str>,
        seed: &ClientSeed,
    ) -> Result<ResolvedClient>;
}

#[async_trait]
pub trait SchemeDirectory: Send + Sync {
    async fn find_scheme_by_isin(&self, isin: &str) -> Result<Option<SchemeRef>>;

    async fn find_scheme_by_registrar_code(&self, code: i64) -> Result<Option<SchemeRef>>;
}

#[async_trait]
pub trait HoldingStore: Send + Sync {
    async fn create_holding(&self, input: &HoldingInput) -> Result<Holding>;
}

#[async_trait]
pub trait ImportRunStore: Send + Sync {
    /// Creates the run in PROCESSING status with zeroed counters.
    async fn create_import_run(&self, run: &NewImportRun) -> Result<ImportRun>;

    async fn update_import_run(&self, id: &str, update: &RunUpdate) -> Result<()>;

    async fn find_import_run(&self, id: &str, advisor_id: &str) -> Result<Option<ImportRun>>;

    /// Newest first.
    async fn list_import_runs(&self, advisor_id: &str) -> Result<Vec<ImportRun>>;
}
