//! SQLite catalog adapter.
//!
//! Two tables back the [`Catalog`] port:
//! - `data_files`: one row per bucket file with its timestamp bounds
//!   (epoch nanoseconds, the precision bucket files keep, so overlap checks
//!   are plain range predicates).
//! - `day_coverage`: the day-completeness index used for gap planning.

use crate::domain::catalog::{CatalogEntry, CatalogFilter, CoverageSummary};
use crate::domain::error::CacheError;
use crate::domain::series::{SeriesKey, Timeframe};
use crate::ports::catalog_port::Catalog;
use crate::ports::config_port::ConfigPort;
use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const DAY_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteCatalog {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: r2d2::Error) -> CacheError {
    CacheError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> CacheError {
    CacheError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_err<E>(len: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(len, rusqlite::types::Type::Text, Box::new(e))
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct RowError(String);

/// Stored form of a timestamp. Instants outside 1677..2262 do not fit in an `i64`.
fn to_nanos(ts: DateTime<Utc>) -> Result<i64, CacheError> {
    ts.timestamp_nanos_opt().ok_or_else(|| CacheError::Validation {
        reason: format!("timestamp {} is outside the catalog's range", ts.to_rfc3339()),
    })
}

/// Window bound for a predicate; out-of-range instants clamp to the widest value.
fn bound_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt()
        .unwrap_or(if ts.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

fn nanos_to_utc(ns: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(ns)
}

fn parse_day(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DAY_FORMAT).map_err(|e| conversion_err(s.len(), e))
}

fn parse_timeframe(s: &str) -> rusqlite::Result<Timeframe> {
    s.parse::<Timeframe>()
        .map_err(|e| conversion_err(s.len(), RowError(e.to_string())))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let timeframe: String = row.get(2)?;
    let file_path: String = row.get(3)?;
    let row_count: i64 = row.get(6)?;
    Ok(CatalogEntry {
        key: SeriesKey::new(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            parse_timeframe(&timeframe)?,
        ),
        file_path: PathBuf::from(file_path),
        min_timestamp: nanos_to_utc(row.get(4)?),
        max_timestamp: nanos_to_utc(row.get(5)?),
        row_count: row_count.max(0) as usize,
        updated_at: nanos_to_utc(row.get(7)?),
    })
}

/// `WHERE` fragment plus positional values for an optional filter.
fn filter_clause(filter: &CatalogFilter) -> (String, Vec<String>) {
    let mut parts = Vec::new();
    let mut values = Vec::new();
    let columns = [
        ("provider", &filter.provider),
        ("symbol", &filter.symbol),
        ("timeframe", &filter.timeframe),
    ];
    for (column, value) in columns {
        if let Some(v) = value {
            values.push(v.clone());
            parts.push(format!("{column} = ?{}", values.len()));
        }
    }
    let clause = if parts.is_empty() {
        "1=1".to_string()
    } else {
        parts.join(" AND ")
    };
    (clause, values)
}

const ENTRY_COLUMNS: &str =
    "provider, symbol, timeframe, file_path, min_ts_ns, max_ts_ns, row_count, updated_at_ns";

impl SqliteCatalog {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CacheError> {
        let db_path = config.require_string("catalog", "path")?;
        let pool_size = config.get_int("catalog", "pool_size", 4);
        if pool_size < 1 {
            return Err(CacheError::ConfigInvalid {
                section: "catalog".into(),
                key: "pool_size".into(),
                reason: "pool_size must be at least 1".into(),
            });
        }
        Self::open(Path::new(&db_path), pool_size as u32)
    }

    /// Opens (creating if needed) a file-backed catalog in WAL mode.
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        let catalog = Self { pool };
        catalog.initialize_schema()?;
        info!(path = %path.display(), "catalog opened");
        Ok(catalog)
    }

    /// Single-connection in-memory catalog; every handle sees the same database.
    pub fn in_memory() -> Result<Self, CacheError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;

        let catalog = Self { pool };
        catalog.initialize_schema()?;
        debug!("in-memory catalog initialized");
        Ok(catalog)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, CacheError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), CacheError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS data_files (
                provider TEXT NOT NULL,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                file_path TEXT NOT NULL,
                min_ts_ns INTEGER NOT NULL,
                max_ts_ns INTEGER NOT NULL,
                row_count INTEGER NOT NULL,
                updated_at_ns INTEGER NOT NULL,
                PRIMARY KEY (provider, symbol, timeframe, file_path)
            );
            CREATE INDEX IF NOT EXISTS idx_data_files_bounds
                ON data_files(provider, symbol, timeframe, min_ts_ns, max_ts_ns);
            CREATE TABLE IF NOT EXISTS day_coverage (
                provider TEXT NOT NULL,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                day TEXT NOT NULL,
                PRIMARY KEY (provider, symbol, timeframe, day)
            );",
        )
        .map_err(query_err)?;

        Ok(())
    }
}

impl Catalog for SqliteCatalog {
    fn upsert(&self, entry: &CatalogEntry) -> Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO data_files
                (provider, symbol, timeframe, file_path, min_ts_ns, max_ts_ns, row_count, updated_at_ns)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.key.provider,
                entry.key.symbol,
                entry.key.timeframe.to_string(),
                entry.file_path.display().to_string(),
                to_nanos(entry.min_timestamp)?,
                to_nanos(entry.max_timestamp)?,
                entry.row_count as i64,
                to_nanos(entry.updated_at)?,
            ],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn entry(&self, key: &SeriesKey, file_path: &Path) -> Result<Option<CatalogEntry>, CacheError> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM data_files
             WHERE provider = ?1 AND symbol = ?2 AND timeframe = ?3 AND file_path = ?4"
        );
        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let mut rows = stmt
            .query_map(
                params![
                    key.provider,
                    key.symbol,
                    key.timeframe.to_string(),
                    file_path.display().to_string()
                ],
                entry_from_row,
            )
            .map_err(query_err)?;

        rows.next().transpose().map_err(query_err)
    }

    fn files_covering(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CatalogEntry>, CacheError> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM data_files
             WHERE provider = ?1 AND symbol = ?2 AND timeframe = ?3
               AND min_ts_ns < ?4 AND max_ts_ns >= ?5
             ORDER BY min_ts_ns ASC"
        );
        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![
                    key.provider,
                    key.symbol,
                    key.timeframe.to_string(),
                    bound_nanos(end),
                    bound_nanos(start)
                ],
                entry_from_row,
            )
            .map_err(query_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(query_err)?);
        }
        Ok(entries)
    }

    fn has_any_overlap(
        &self,
        key: &SeriesKey,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM data_files
                WHERE provider = ?1 AND symbol = ?2 AND timeframe = ?3
                  AND min_ts_ns < ?4 AND max_ts_ns >= ?5
             )",
            params![
                key.provider,
                key.symbol,
                key.timeframe.to_string(),
                bound_nanos(end),
                bound_nanos(start)
            ],
            |row| row.get::<_, bool>(0),
        )
        .map_err(query_err)
    }

    fn mark_days_complete(&self, key: &SeriesKey, days: &[NaiveDate]) -> Result<(), CacheError> {
        if days.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO day_coverage (provider, symbol, timeframe, day)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(query_err)?;
            let timeframe = key.timeframe.to_string();
            for day in days {
                stmt.execute(params![
                    key.provider,
                    key.symbol,
                    timeframe,
                    day.format(DAY_FORMAT).to_string()
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;

        debug!(series = %key, days = days.len(), "days marked complete");
        Ok(())
    }

    fn complete_days(
        &self,
        key: &SeriesKey,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT day FROM day_coverage
                 WHERE provider = ?1 AND symbol = ?2 AND timeframe = ?3
                   AND day >= ?4 AND day <= ?5",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![
                    key.provider,
                    key.symbol,
                    key.timeframe.to_string(),
                    first.format(DAY_FORMAT).to_string(),
                    last.format(DAY_FORMAT).to_string()
                ],
                |row| {
                    let day: String = row.get(0)?;
                    parse_day(&day)
                },
            )
            .map_err(query_err)?;

        let mut days = BTreeSet::new();
        for row in rows {
            days.insert(row.map_err(query_err)?);
        }
        Ok(days)
    }

    fn coverage_summary(&self, filter: &CatalogFilter) -> Result<Vec<CoverageSummary>, CacheError> {
        let conn = self.conn()?;
        let (clause, values) = filter_clause(filter);

        type SeriesId = (String, String, String);
        let mut summaries: BTreeMap<SeriesId, (usize, Option<NaiveDate>, Option<NaiveDate>, usize)> =
            BTreeMap::new();

        let day_query = format!(
            "SELECT provider, symbol, timeframe, COUNT(*), MIN(day), MAX(day)
             FROM day_coverage WHERE {clause}
             GROUP BY provider, symbol, timeframe"
        );
        let mut stmt = conn.prepare(&day_query).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let id: SeriesId = (row.get(0)?, row.get(1)?, row.get(2)?);
                let first: String = row.get(4)?;
                let last: String = row.get(5)?;
                Ok((
                    id,
                    row.get::<_, i64>(3)?,
                    parse_day(&first)?,
                    parse_day(&last)?,
                ))
            })
            .map_err(query_err)?;
        for row in rows {
            let (id, count, first, last) = row.map_err(query_err)?;
            let slot = summaries.entry(id).or_insert((0, None, None, 0));
            slot.0 = count.max(0) as usize;
            slot.1 = Some(first);
            slot.2 = Some(last);
        }

        let row_query = format!(
            "SELECT provider, symbol, timeframe, SUM(row_count)
             FROM data_files WHERE {clause}
             GROUP BY provider, symbol, timeframe"
        );
        let mut stmt = conn.prepare(&row_query).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let id: SeriesId = (row.get(0)?, row.get(1)?, row.get(2)?);
                Ok((id, row.get::<_, i64>(3)?))
            })
            .map_err(query_err)?;
        for row in rows {
            let (id, total) = row.map_err(query_err)?;
            summaries.entry(id).or_insert((0, None, None, 0)).3 = total.max(0) as usize;
        }

        let mut out = Vec::with_capacity(summaries.len());
        for ((provider, symbol, timeframe), (day_count, first_day, last_day, total_rows)) in summaries {
            let timeframe = parse_timeframe(&timeframe).map_err(query_err)?;
            out.push(CoverageSummary {
                key: SeriesKey::new(provider, symbol, timeframe),
                day_count,
                first_day,
                last_day,
                total_rows,
            });
        }
        Ok(out)
    }

    fn clear(&self, filter: &CatalogFilter) -> Result<Vec<CatalogEntry>, CacheError> {
        let (clause, values) = filter_clause(filter);

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let mut removed = Vec::new();
        {
            let query = format!("SELECT {ENTRY_COLUMNS} FROM data_files WHERE {clause}");
            let mut stmt = tx.prepare(&query).map_err(query_err)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), entry_from_row)
                .map_err(query_err)?;
            for row in rows {
                removed.push(row.map_err(query_err)?);
            }
        }

        tx.execute(
            &format!("DELETE FROM data_files WHERE {clause}"),
            params_from_iter(values.iter()),
        )
        .map_err(query_err)?;
        let days = tx
            .execute(
                &format!("DELETE FROM day_coverage WHERE {clause}"),
                params_from_iter(values.iter()),
            )
            .map_err(query_err)?;
        tx.commit().map_err(query_err)?;

        info!(files = removed.len(), days, "catalog cleared");
        Ok(removed)
    }
}
