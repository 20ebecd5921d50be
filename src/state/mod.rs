use crate::domain::{DomainKey, Zone};
use crate::error::StorageError;
use crate::models::{Availability, HistoryRecord, LookupResult, RegistrationDetails};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{ConnectOptions, Pool, Sqlite, sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Durable cache of the latest result per domain plus an append-only
/// lookup history, both in one SQLite file.
pub struct ResultStore {
    pool: Pool<Sqlite>,
}

#[derive(sqlx::FromRow)]
struct CheckRow {
    domain: String,
    zone: String,
    status: String,
    owner: Option<String>,
    document_id: Option<String>,
    registration_date: Option<String>,
    expiration_date: Option<String>,
    check_date: String,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    #[sqlx(flatten)]
    check: CheckRow,
}

impl ResultStore {
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite:{}", db_path.as_ref().to_string_lossy());

        let connection_options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5000))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await
            .context("Failed to connect to SQLite")?;

        let store = Self { pool };
        store
            .initialize_schema()
            .await
            .context("Failed to initialize result store schema")?;

        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS domain_checks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                zone TEXT NOT NULL,
                status TEXT NOT NULL, -- available, registered
                owner TEXT,
                document_id TEXT,
                registration_date TEXT,
                expiration_date TEXT,
                check_date TEXT NOT NULL, -- RFC 3339, UTC, microseconds
                UNIQUE(domain, zone)
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS domain_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                zone TEXT NOT NULL,
                status TEXT NOT NULL,
                owner TEXT,
                document_id TEXT,
                registration_date TEXT,
                expiration_date TEXT,
                check_date TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_check_date ON domain_history (check_date)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Latest stored result for `key`, whatever its age.
    pub async fn get(&self, key: &DomainKey) -> Result<Option<LookupResult>, StorageError> {
        let row = sqlx::query_as::<_, CheckRow>(
            "SELECT domain, zone, status, owner, document_id, registration_date, expiration_date, check_date
             FROM domain_checks
             WHERE domain = ? AND zone = ?",
        )
        .bind(key.label())
        .bind(key.zone().as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_result()).transpose()
    }

    /// Stored result for `key` if it is at most `max_age` old. Expired
    /// entries are reported absent but stay on disk.
    pub async fn get_if_fresh(
        &self,
        key: &DomainKey,
        max_age: Duration,
    ) -> Result<Option<LookupResult>, StorageError> {
        let fresh = self
            .get(key)
            .await?
            .filter(|result| age_of(result) <= max_age);
        Ok(fresh)
    }

    /// Replaces the cache entry for `key` and appends a history record in
    /// one transaction.
    ///
    /// The entry is only overwritten when `result` is at least as recent as
    /// what is stored, so a slow fetch can never clobber a newer one.
    /// Returns whether the cache entry was replaced; the history record is
    /// appended either way.
    pub async fn upsert(&self, key: &DomainKey, result: &LookupResult) -> Result<bool, StorageError> {
        let details = result.availability.details().cloned().unwrap_or_default();
        let check_date = encode_timestamp(&result.checked_at);

        let mut tx = self.pool.begin().await?;

        let replaced = sqlx::query(
            "INSERT INTO domain_checks
             (domain, zone, status, owner, document_id, registration_date, expiration_date, check_date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(domain, zone) DO UPDATE SET
                status = excluded.status,
                owner = excluded.owner,
                document_id = excluded.document_id,
                registration_date = excluded.registration_date,
                expiration_date = excluded.expiration_date,
                check_date = excluded.check_date
             WHERE excluded.check_date >= domain_checks.check_date",
        )
        .bind(key.label())
        .bind(key.zone().as_str())
        .bind(result.availability.status())
        .bind(details.owner.as_deref())
        .bind(details.document_id.as_deref())
        .bind(details.registration_date.as_deref())
        .bind(details.expiration_date.as_deref())
        .bind(check_date.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        sqlx::query(
            "INSERT INTO domain_history
             (domain, zone, status, owner, document_id, registration_date, expiration_date, check_date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(key.label())
        .bind(key.zone().as_str())
        .bind(result.availability.status())
        .bind(details.owner.as_deref())
        .bind(details.document_id.as_deref())
        .bind(details.registration_date.as_deref())
        .bind(details.expiration_date.as_deref())
        .bind(check_date.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if !replaced {
            tracing::debug!("Kept newer cache entry for {}; result from {} only logged", key, check_date);
        }
        Ok(replaced)
    }

    /// Up to `limit` most recent history records, newest first.
    pub async fn recent_history(&self, limit: u32) -> Result<Vec<HistoryRecord>, StorageError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, domain, zone, status, owner, document_id, registration_date, expiration_date, check_date
             FROM domain_history
             ORDER BY check_date DESC, id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<HistoryRecord, StorageError> {
                let key = row.check.key()?;
                Ok(HistoryRecord {
                    id: row.id,
                    key,
                    result: row.check.into_result()?,
                })
            })
            .collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl CheckRow {
    fn key(&self) -> Result<DomainKey, StorageError> {
        let zone = Zone::from_str(&self.zone).map_err(|_| StorageError::Corrupt {
            column: "zone",
            value: self.zone.clone(),
        })?;
        DomainKey::new(&self.domain, zone).map_err(|_| StorageError::Corrupt {
            column: "domain",
            value: self.domain.clone(),
        })
    }

    fn into_result(self) -> Result<LookupResult, StorageError> {
        let checked_at = decode_timestamp(&self.check_date)?;
        let availability = match self.status.as_str() {
            "available" => Availability::Available,
            "registered" => Availability::Registered(RegistrationDetails {
                owner: self.owner,
                document_id: self.document_id,
                registration_date: self.registration_date,
                expiration_date: self.expiration_date,
            }),
            _ => {
                return Err(StorageError::Corrupt {
                    column: "status",
                    value: self.status,
                });
            }
        };
        Ok(LookupResult::new(availability, checked_at))
    }
}

/// Fixed-width UTC form, so text comparison in SQL is chronological.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StorageError::Corrupt {
            column: "check_date",
            value: value.to_string(),
        })
}

/// Timestamps in the future count as age zero.
fn age_of(result: &LookupResult) -> Duration {
    (Utc::now() - result.checked_at).to_std().unwrap_or_default()
}
