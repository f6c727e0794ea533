use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    Client, ClientSeed, Holding, HoldingInput, ImportRun, ImportStatus, NewImportRun, ResolvedClient,
    RowError, RunUpdate, SchemeRef,
};
use crate::store::{ClientDirectory, HoldingStore, ImportRunStore, SchemeDirectory};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const CLIENT_COLUMNS: &str =
    "id, advisor_id, name, pan, email, phone, city, state, pincode, kyc_status, tags";

const HOLDING_COLUMNS: &str = "h.id, h.client_id, h.scheme_plan_id, h.fund_name, h.fund_scheme_code, \
     h.fund_category, h.asset_class, h.folio_number, h.units, h.avg_nav, h.current_nav, \
     h.invested_value, h.current_value, h.absolute_gain, h.absolute_gain_pct, h.last_txn_date";

const RUN_COLUMNS: &str = "id, advisor_id, format, file_name, file_size, status, total_records, \
     imported_clients, imported_holdings, skipped_records, error_records, errors, created_at";

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

/// Reads a TEXT column through `FromStr` (decimals, enums).
fn text_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn count_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<usize> {
    let n: i64 = row.get(idx)?;
    Ok(n.max(0) as usize)
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        advisor_id: row.get(1)?,
        name: row.get(2)?,
        pan: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        city: row.get(6)?,
        state: row.get(7)?,
        pincode: row.get(8)?,
        kyc_status: text_column(row, 9)?,
        tags: json_column(row, 10)?,
    })
}

fn holding_from_row(row: &Row<'_>) -> rusqlite::Result<Holding> {
    Ok(Holding {
        id: row.get(0)?,
        details: HoldingInput {
            client_id: row.get(1)?,
            scheme_plan_id: row.get(2)?,
            fund_name: row.get(3)?,
            fund_scheme_code: row.get(4)?,
            fund_category: row.get(5)?,
            asset_class: text_column(row, 6)?,
            folio_number: row.get(7)?,
            units: text_column(row, 8)?,
            avg_nav: text_column(row, 9)?,
            current_nav: text_column(row, 10)?,
            invested_value: text_column(row, 11)?,
            current_value: text_column(row, 12)?,
            absolute_gain: text_column(row, 13)?,
            absolute_gain_pct: text_column(row, 14)?,
            last_txn_date: datetime_column(row, 15)?,
        },
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<ImportRun> {
    let file_size: i64 = row.get(4)?;
    Ok(ImportRun {
        id: row.get(0)?,
        advisor_id: row.get(1)?,
        format: text_column(row, 2)?,
        file_name: row.get(3)?,
        file_size: file_size.max(0) as u64,
        status: text_column(row, 5)?,
        total_records: count_column(row, 6)?,
        imported_clients: count_column(row, 7)?,
        imported_holdings: count_column(row, 8)?,
        skipped_records: count_column(row, 9)?,
        error_records: count_column(row, 10)?,
        errors: json_column(row, 11)?,
        created_at: timestamp_column(row, 12)?,
    })
}

/// A scheme plan row for the scheme directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemePlan {
    pub plan_id: String,
    pub scheme_name: String,
    pub isin: Option<String>,
    pub registrar_code: Option<i64>,
    pub category: Option<String>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        // NULL pans never collide, so PAN-less clients are always distinct.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                advisor_id TEXT NOT NULL,
                name TEXT NOT NULL,
                pan TEXT,
                email TEXT NOT NULL,
                phone TEXT NOT NULL,
                city TEXT,
                state TEXT,
                pincode TEXT,
                kyc_status TEXT NOT NULL,
                tags TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (advisor_id, pan)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS scheme_plans (
                id TEXT PRIMARY KEY,
                scheme_name TEXT NOT NULL,
                isin TEXT,
                registrar_code INTEGER,
                category TEXT
            )",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scheme_plans_isin ON scheme_plans (isin)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scheme_plans_code ON scheme_plans (registrar_code)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS holdings (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES clients (id),
                scheme_plan_id TEXT,
                fund_name TEXT NOT NULL,
                fund_scheme_code TEXT NOT NULL,
                fund_category TEXT NOT NULL,
                asset_class TEXT NOT NULL,
                folio_number TEXT NOT NULL,
                units TEXT NOT NULL,
                avg_nav TEXT NOT NULL,
                current_nav TEXT NOT NULL,
                invested_value TEXT NOT NULL,
                current_value TEXT NOT NULL,
                absolute_gain TEXT NOT NULL,
                absolute_gain_pct TEXT NOT NULL,
                last_txn_date TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS import_runs (
                id TEXT PRIMARY KEY,
                advisor_id TEXT NOT NULL,
                format TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                status TEXT NOT NULL,
                total_records INTEGER NOT NULL DEFAULT 0,
                imported_clients INTEGER NOT NULL DEFAULT 0,
                imported_holdings INTEGER NOT NULL DEFAULT 0,
                skipped_records INTEGER NOT NULL DEFAULT 0,
                error_records INTEGER NOT NULL DEFAULT 0,
                errors TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_import_runs_advisor ON import_runs (advisor_id, created_at)",
            [],
        )?;

        Ok(())
    }

    pub fn find_client_by_pan(&self, advisor_id: &str, pan: &str) -> Result<Option<Client>> {
        let sql = format!("SELECT {} FROM clients WHERE advisor_id = ?1 AND pan = ?2", CLIENT_COLUMNS);
        let client = self
            .conn
            .query_row(&sql, params![advisor_id, pan], client_from_row)
            .optional()?;
        Ok(client)
    }

    pub fn get_client(&self, id: &str) -> Result<Option<Client>> {
        let sql = format!("SELECT {} FROM clients WHERE id = ?1", CLIENT_COLUMNS);
        Ok(self.conn.query_row(&sql, params![id], client_from_row).optional()?)
    }

    /// Inserts unless `(advisor, pan)` already exists. Returns the stored client
    /// and whether this call created it.
    pub fn find_or_create_client(
        &self,
        advisor_id: &str,
        pan: Option<&str>,
        seed: &ClientSeed,
    ) -> Result<ResolvedClient> {
        if let Some(pan) = pan {
            if let Some(client) = self.find_client_by_pan(advisor_id, pan)? {
                return Ok(ResolvedClient { client, created: false });
            }
        }

        let id = Uuid::new_v4().to_string();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO clients (
                id, advisor_id, name, pan, email, phone, city, state, pincode, kyc_status, tags
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                advisor_id,
                seed.name,
                pan,
                seed.email,
                seed.phone,
                seed.city,
                seed.state,
                seed.pincode,
                seed.kyc_status.as_str(),
                serde_json::to_string(&seed.tags)?,
            ],
        )?;

        // Zero rows means another writer inserted the same (advisor, pan) first.
        let client = match (inserted, pan) {
            (0, Some(pan)) => self.find_client_by_pan(advisor_id, pan)?,
            _ => self.get_client(&id)?,
        }
        .ok_or_else(|| anyhow!("Client for advisor {} missing after insert", advisor_id))?;

        Ok(ResolvedClient {
            client,
            created: inserted > 0,
        })
    }

    pub fn list_clients(&self, advisor_id: &str) -> Result<Vec<Client>> {
        let sql = format!(
            "SELECT {} FROM clients WHERE advisor_id = ?1 ORDER BY rowid",
            CLIENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let clients = stmt
            .query_map(params![advisor_id], client_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    pub fn save_scheme(&self, plan: &SchemePlan) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO scheme_plans (id, scheme_name, isin, registrar_code, category)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                plan.plan_id,
                plan.scheme_name,
                plan.isin,
                plan.registrar_code,
                plan.category
            ],
        )?;
        Ok(())
    }

    fn find_scheme(&self, column: &str, value: &dyn rusqlite::ToSql) -> Result<Option<SchemeRef>> {
        let sql = format!(
            "SELECT id, scheme_name, isin, category FROM scheme_plans WHERE {} = ?1 ORDER BY rowid LIMIT 1",
            column
        );
        let scheme = self
            .conn
            .query_row(&sql, [value], |row| {
                Ok(SchemeRef {
                    plan_id: row.get(0)?,
                    scheme_name: row.get(1)?,
                    isin: row.get(2)?,
                    category: row.get(3)?,
                })
            })
            .optional()?;
        Ok(scheme)
    }

    pub fn find_scheme_by_isin(&self, isin: &str) -> Result<Option<SchemeRef>> {
        self.find_scheme("isin", &isin)
    }

    pub fn find_scheme_by_registrar_code(&self, code: i64) -> Result<Option<SchemeRef>> {
        self.find_scheme("registrar_code", &code)
    }

    pub fn insert_holding(&self, input: &HoldingInput) -> Result<Holding> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO holdings (
                id, client_id, scheme_plan_id, fund_name, fund_scheme_code, fund_category,
                asset_class, folio_number, units, avg_nav, current_nav, invested_value,
                current_value, absolute_gain, absolute_gain_pct, last_txn_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                id,
                input.client_id,
                input.scheme_plan_id,
                input.fund_name,
                input.fund_scheme_code,
                input.fund_category,
                input.asset_class.as_str(),
                input.folio_number,
                input.units.to_string(),
                input.avg_nav.to_string(),
                input.current_nav.to_string(),
                input.invested_value.to_string(),
                input.current_value.to_string(),
                input.absolute_gain.to_string(),
                input.absolute_gain_pct.to_string(),
                input.last_txn_date.format(DATETIME_FORMAT).to_string(),
            ],
        )?;
        Ok(Holding {
            id,
            details: input.clone(),
        })
    }

    pub fn list_holdings(&self, advisor_id: &str) -> Result<Vec<Holding>> {
        let sql = format!(
            "SELECT {} FROM holdings h JOIN clients c ON c.id = h.client_id
             WHERE c.advisor_id = ?1 ORDER BY h.rowid",
            HOLDING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let holdings = stmt
            .query_map(params![advisor_id], holding_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(holdings)
    }

    pub fn create_import_run(&self, run: &NewImportRun) -> Result<ImportRun> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO import_runs (
                id, advisor_id, format, file_name, file_size, status, total_records, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                run.advisor_id,
                run.format.as_str(),
                run.file_name,
                run.file_size as i64,
                ImportStatus::Processing.as_str(),
                run.total_records as i64,
                created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        self.get_import_run(&id)?
            .ok_or_else(|| anyhow!("Import run {} missing after insert", id))
    }

    fn get_import_run(&self, id: &str) -> Result<Option<ImportRun>> {
        let sql = format!("SELECT {} FROM import_runs WHERE id = ?1", RUN_COLUMNS);
        Ok(self.conn.query_row(&sql, params![id], run_from_row).optional()?)
    }

    /// Moves the run to its terminal state. Rejects transitions the status
    /// machine does not allow, so a finished run is never rewritten.
    pub fn update_import_run(&self, id: &str, update: &RunUpdate) -> Result<()> {
        let current: ImportStatus = match self
            .conn
            .query_row("SELECT status FROM import_runs WHERE id = ?1", params![id], |row| {
                text_column(row, 0)
            })
            .optional()?
        {
            Some(status) => status,
            None => bail!("Import run {} not found", id),
        };

        let next = match update {
            RunUpdate::Finished(outcome) => outcome.status,
            RunUpdate::Aborted(_) => ImportStatus::Failed,
        };
        if !current.can_transition_to(next) {
            bail!("Import run {} cannot move from {} to {}", id, current, next);
        }

        match update {
            RunUpdate::Finished(outcome) => {
                self.conn.execute(
                    "UPDATE import_runs SET status = ?2, imported_clients = ?3, imported_holdings = ?4,
                     skipped_records = ?5, error_records = ?6, errors = ?7 WHERE id = ?1",
                    params![
                        id,
                        outcome.status.as_str(),
                        outcome.imported_clients as i64,
                        outcome.imported_holdings as i64,
                        outcome.skipped_records as i64,
                        outcome.errors.len() as i64,
                        serde_json::to_string(&outcome.errors)?,
                    ],
                )?;
            }
            RunUpdate::Aborted(error) => {
                let errors: Vec<&RowError> = vec![error];
                self.conn.execute(
                    "UPDATE import_runs SET status = ?2, error_records = 1, errors = ?3 WHERE id = ?1",
                    params![id, ImportStatus::Failed.as_str(), serde_json::to_string(&errors)?],
                )?;
            }
        }
        Ok(())
    }

    pub fn find_import_run(&self, id: &str, advisor_id: &str) -> Result<Option<ImportRun>> {
        let sql = format!(
            "SELECT {} FROM import_runs WHERE id = ?1 AND advisor_id = ?2",
            RUN_COLUMNS
        );
        let run = self
            .conn
            .query_row(&sql, params![id, advisor_id], run_from_row)
            .optional()?;
        Ok(run)
    }

    pub fn list_import_runs(&self, advisor_id: &str) -> Result<Vec<ImportRun>> {
        let sql = format!(
            "SELECT {} FROM import_runs WHERE advisor_id = ?1 ORDER BY created_at DESC, rowid DESC",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![advisor_id], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}

/// Shares one `Database` between concurrent runs.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::new(Database::new(path)?))
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }
}

#[async_trait]
impl ClientDirectory for SqliteStore {
    async fn find_or_create_client(
        &self,
        advisor_id: &str,
        pan: Option<&str>,
        seed: &ClientSeed,
    ) -> Result<ResolvedClient> {
        self.db.lock().await.find_or_create_client(advisor_id, pan, seed)
    }
}

#[async_trait]
impl SchemeDirectory for SqliteStore {
    async fn find_scheme_by_isin(&self, isin: &str) -> Result<Option<SchemeRef>> {
        self.db.lock().await.find_scheme_by_isin(isin)
    }

    async fn find_scheme_by_registrar_code(&self, code: i64) -> Result<Option<SchemeRef>> {
        self.db.lock().await.find_scheme_by_registrar_code(code)
    }
}

#[async_trait]
impl HoldingStore for SqliteStore {
    async fn create_holding(&self, input: &HoldingInput) -> Result<Holding> {
        self.db.lock().await.insert_holding(input)
    }
}

#[async_trait]
impl ImportRunStore for SqliteStore {
    async fn create_import_run(&self, run: &NewImportRun) -> Result<ImportRun> {
        self.db.lock().await.create_import_run(run)
    }

    async fn update_import_run(&self, id: &str, update: &RunUpdate) -> Result<()> {
        self.db.lock().await.update_import_run(id, update)
    }

    async fn find_import_run(&self, id: &str, advisor_id: &str) -> Result<Option<ImportRun>> {
        self.db.lock().await.find_import_run(id, advisor_id)
    }

    async fn list_import_runs(&self, advisor_id: &str) -> Result<Vec<ImportRun>> {
        self.db.lock().await.list_import_runs(advisor_id)
    }
}
