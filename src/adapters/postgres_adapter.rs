//! PostgreSQL forecast store.
//!
//! Same table layout as the SQLite store; timestamps are stored as RFC 3339
//! text so both backends decode rows identically.

use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;

use crate::adapters::timestamp;
use crate::domain::error::SettlerError;
use crate::domain::forecast::{ForecastRow, Loaded, Resolution, STATUS_OPEN, status_code};
use crate::ports::config_port::ConfigPort;
use crate::ports::forecast_store::ForecastStore;

const COLUMNS: &str = "id, ticker, direction, floor, ceiling, start_price, current_price, \
                       confidence, status, parent_id, end_price, profit_rate, \
                       profit_rate_adjusted, resolved_at";

pub struct PostgresAdapter {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

fn db_err(e: r2d2::Error) -> SettlerError {
    SettlerError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: postgres::Error) -> SettlerError {
    SettlerError::DatabaseQuery {
        reason: e.to_string(),
    }
}

/// A column of the wrong type reads as absent, so validation reports it.
fn read_row(row: &Row) -> ForecastRow {
    ForecastRow {
        id: row.try_get(0).unwrap_or_default(),
        ticker: row.try_get(1).ok().flatten(),
        direction: row.try_get(2).ok().flatten(),
        floor: row.try_get(3).ok().flatten(),
        ceiling: row.try_get(4).ok().flatten(),
        start_price: row.try_get(5).ok().flatten(),
        current_price: row.try_get(6).ok().flatten(),
        confidence: row
            .try_get::<_, Option<i32>>(7)
            .ok()
            .flatten()
            .map(i64::from),
        status: row.try_get(8).ok().flatten(),
        parent_id: row.try_get(9).ok().flatten(),
        end_price: row.try_get(10).ok().flatten(),
        profit_rate: row.try_get(11).ok().flatten(),
        profit_rate_adjusted: row.try_get(12).ok().flatten(),
        resolved_at: row.try_get(13).ok().flatten(),
    }
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SettlerError> {
        let connection_string = config.require_string("postgres", "connection_string")?;
        let pool_size = config.get_int("postgres", "pool_size", 4)?.max(1) as u32;

        let pg_config = connection_string
            .parse()
            .map_err(|e: postgres::Error| SettlerError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), SettlerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS forecasts (
                id TEXT PRIMARY KEY,
                ticker TEXT,
                direction TEXT,
                floor DOUBLE PRECISION,
                ceiling DOUBLE PRECISION,
                start_price DOUBLE PRECISION,
                current_price DOUBLE PRECISION,
                confidence INTEGER,
                status TEXT NOT NULL DEFAULT 'pending',
                parent_id TEXT,
                end_price DOUBLE PRECISION,
                profit_rate DOUBLE PRECISION,
                profit_rate_adjusted DOUBLE PRECISION,
                resolved_at TEXT,
                current_price_updated_at TEXT,
                created_at TEXT,
                updated_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_forecasts_status ON forecasts(status);
            CREATE INDEX IF NOT EXISTS idx_forecasts_parent ON forecasts(parent_id, status);",
        )
        .map_err(query_err)
    }

    fn query_rows(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Loaded>, SettlerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let rows = conn.query(sql, params).map_err(query_err)?;
        Ok(rows.iter().map(|row| read_row(row).validate()).collect())
    }
}

impl ForecastStore for PostgresAdapter {
    fn list_open(&self) -> Result<Vec<Loaded>, SettlerError> {
        self.query_rows(
            &format!("SELECT {COLUMNS} FROM forecasts WHERE status = $1 ORDER BY created_at, id"),
            &[&STATUS_OPEN],
        )
    }

    fn update_current_price(
        &self,
        id: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, SettlerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let changed = conn
            .execute(
                "UPDATE forecasts
                 SET current_price = $1, current_price_updated_at = $2, updated_at = $2
                 WHERE id = $3 AND status = $4",
                &[&price, &timestamp(at), &id, &STATUS_OPEN],
            )
            .map_err(query_err)?;

        Ok(changed == 1)
    }

    fn resolve_if_open(&self, id: &str, resolution: &Resolution) -> Result<bool, SettlerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let changed = conn
            .execute(
                "UPDATE forecasts
                 SET status = $1, end_price = $2, profit_rate = $3, profit_rate_adjusted = $4,
                     resolved_at = $5, updated_at = $5
                 WHERE id = $6 AND status = $7",
                &[
                    &status_code(resolution.outcome, resolution.mode),
                    &resolution.end_price,
                    &resolution.profit_rate,
                    &resolution.profit_rate_adjusted,
                    &timestamp(resolution.resolved_at),
                    &id,
                    &STATUS_OPEN,
                ],
            )
            .map_err(query_err)?;

        Ok(changed == 1)
    }

    fn list_open_children(&self, parent_id: &str) -> Result<Vec<Loaded>, SettlerError> {
        self.query_rows(
            &format!(
                "SELECT {COLUMNS} FROM forecasts WHERE parent_id = $1 AND status = $2 ORDER BY created_at, id"
            ),
            &[&parent_id, &STATUS_OPEN],
        )
    }

    fn find(&self, id: &str) -> Result<Option<Loaded>, SettlerError> {
        Ok(self
            .query_rows(&format!("SELECT {COLUMNS} FROM forecasts WHERE id = $1"), &[&id])?
            .into_iter()
            .next())
    }
}
