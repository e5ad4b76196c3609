//! SQLite forecast store.

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{params, OptionalExtension, Row};

use crate::adapters::timestamp;
use crate::domain::error::SettlerError;
use crate::domain::forecast::{Forecast, ForecastRow, Loaded, Resolution, STATUS_OPEN, status_code};
use crate::domain::price::parse_price_text;
use crate::ports::config_port::ConfigPort;
use crate::ports::forecast_store::ForecastStore;

const COLUMNS: &str = "id, ticker, direction, floor, ceiling, start_price, current_price, \
                       confidence, status, parent_id, end_price, profit_rate, \
                       profit_rate_adjusted, resolved_at";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: r2d2::Error) -> SettlerError {
    SettlerError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> SettlerError {
    SettlerError::DatabaseQuery {
        reason: e.to_string(),
    }
}

/// Numeric column that may hold an integer, a real, or legacy price text.
fn real(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<f64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) => Some(f),
        ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(parse_price_text),
    })
}

fn integer(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) if f.fract() == 0.0 => Some(f as i64),
        ValueRef::Real(_) => None,
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse().ok()),
    })
}

fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
    })
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<ForecastRow> {
    Ok(ForecastRow {
        id: text(row, 0)?.unwrap_or_default(),
        ticker: text(row, 1)?,
        direction: text(row, 2)?,
        floor: real(row, 3)?,
        ceiling: real(row, 4)?,
        start_price: real(row, 5)?,
        current_price: real(row, 6)?,
        confidence: integer(row, 7)?,
        status: text(row, 8)?,
        parent_id: text(row, 9)?,
        end_price: real(row, 10)?,
        profit_rate: real(row, 11)?,
        profit_rate_adjusted: real(row, 12)?,
        resolved_at: text(row, 13)?,
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SettlerError> {
        let db_path = config.require_string("sqlite", "path")?;
        let pool_size = config.get_int("sqlite", "pool_size", 4)?.max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, SettlerError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), SettlerError> {
        let conn = self.pool.get().map_err(db_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS forecasts (
                id TEXT PRIMARY KEY,
                ticker TEXT,
                direction TEXT,
                floor REAL,
                ceiling REAL,
                start_price REAL,
                current_price REAL,
                confidence INTEGER,
                status TEXT NOT NULL DEFAULT 'pending',
                parent_id TEXT,
                end_price REAL,
                profit_rate REAL,
                profit_rate_adjusted REAL,
                resolved_at TEXT,
                current_price_updated_at TEXT,
                created_at TEXT,
                updated_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_forecasts_status ON forecasts(status);
            CREATE INDEX IF NOT EXISTS idx_forecasts_parent ON forecasts(parent_id, status);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    /// Insert or replace forecasts in one transaction.
    pub fn insert_forecasts(&self, forecasts: &[Forecast]) -> Result<(), SettlerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let tx = conn.transaction().map_err(query_err)?;
        let now = timestamp(Utc::now());

        for f in forecasts {
            let resolution = f.status.resolution();
            tx.execute(
                "INSERT OR REPLACE INTO forecasts (
                    id, ticker, direction, floor, ceiling, start_price, current_price,
                    confidence, status, parent_id, end_price, profit_rate,
                    profit_rate_adjusted, resolved_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
                params![
                    f.id,
                    f.ticker,
                    f.direction.as_str(),
                    f.floor,
                    f.ceiling,
                    f.start_price,
                    f.current_price,
                    f.confidence as i64,
                    f.status.code(),
                    f.parent_id,
                    resolution.map(|r| r.end_price),
                    resolution.map(|r| r.profit_rate),
                    resolution.map(|r| r.profit_rate_adjusted),
                    resolution.map(|r| timestamp(r.resolved_at)),
                    now,
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    /// Execute raw SQL, for fixtures and maintenance.
    pub fn execute_batch(&self, sql: &str) -> Result<(), SettlerError> {
        let conn = self.pool.get().map_err(db_err)?;
        conn.execute_batch(sql).map_err(query_err)
    }

    /// Timestamp of the last price refresh, if any.
    pub fn current_price_updated_at(&self, id: &str) -> Result<Option<String>, SettlerError> {
        let conn = self.pool.get().map_err(db_err)?;
        conn.query_row(
            "SELECT current_price_updated_at FROM forecasts WHERE id = ?1",
            params![id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map(Option::flatten)
        .map_err(query_err)
    }

    fn query_rows(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Loaded>, SettlerError> {
        let conn = self.pool.get().map_err(db_err)?;
        let mut stmt = conn.prepare(sql).map_err(query_err)?;
        let rows = stmt.query_map(args, read_row).map_err(query_err)?;

        let mut loaded = Vec::new();
        for row in rows {
            loaded.push(row.map_err(query_err)?.validate());
        }
        Ok(loaded)
    }
}

impl ForecastStore for SqliteAdapter {
    fn list_open(&self) -> Result<Vec<Loaded>, SettlerError> {
        self.query_rows(
            &format!("SELECT {COLUMNS} FROM forecasts WHERE status = ?1 ORDER BY rowid"),
            &[&STATUS_OPEN],
        )
    }

    fn update_current_price(
        &self,
        id: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<bool, SettlerError> {
        let conn = self.pool.get().map_err(db_err)?;
        let changed = conn
            .execute(
                "UPDATE forecasts
                 SET current_price = ?1, current_price_updated_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND status = ?4",
                params![price, timestamp(at), id, STATUS_OPEN],
            )
            .map_err(query_err)?;

        Ok(changed == 1)
    }

    fn resolve_if_open(&self, id: &str, resolution: &Resolution) -> Result<bool, SettlerError> {
        let conn = self.pool.get().map_err(db_err)?;
        let status = status_code(resolution.outcome, resolution.mode);
        let changed = conn
            .execute(
                "UPDATE forecasts
                 SET status = ?1, end_price = ?2, profit_rate = ?3, profit_rate_adjusted = ?4,
                     resolved_at = ?5, updated_at = ?5
                 WHERE id = ?6 AND status = ?7",
                params![
                    status,
                    resolution.end_price,
                    resolution.profit_rate,
                    resolution.profit_rate_adjusted,
                    timestamp(resolution.resolved_at),
                    id,
                    STATUS_OPEN,
                ],
            )
            .map_err(query_err)?;

        Ok(changed == 1)
    }

    fn list_open_children(&self, parent_id: &str) -> Result<Vec<Loaded>, SettlerError> {
        self.query_rows(
            &format!(
                "SELECT {COLUMNS} FROM forecasts WHERE parent_id = ?1 AND status = ?2 ORDER BY rowid"
            ),
            &[&parent_id, &STATUS_OPEN],
        )
    }

    fn find(&self, id: &str) -> Result<Option<Loaded>, SettlerError> {
        Ok(self
            .query_rows(&format!("SELECT {COLUMNS} FROM forecasts WHERE id = ?1"), &[&id])?
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::{Direction, Outcome, ResolutionMode, Status};
    use chrono::TimeZone;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
    }

    fn open(id: &str, ticker: &str, parent: Option<&str>) -> Forecast {
        Forecast {
            id: id.into(),
            ticker: ticker.into(),
            direction: Direction::Up,
            floor: 90.0,
            ceiling: 120.0,
            start_price: 100.0,
            current_price: Some(100.0),
            confidence: 5,
            status: Status::Open,
            parent_id: parent.map(String::from),
        }
    }

    fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn resolution() -> Resolution {
        Resolution {
            outcome: Outcome::Success,
            mode: ResolutionMode::Auto,
            end_price: 120.0,
            profit_rate: 20.0,
            profit_rate_adjusted: 20.0,
            resolved_at: Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap(),
        }
    }

    #[test]
    fn from_config_missing_path() {
        match SqliteAdapter::from_config(&EmptyConfig) {
            Err(SettlerError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn list_open_returns_only_pending() {
        let adapter = adapter();
        let mut done = open("b", "2317", None);
        done.status = Status::Resolved(resolution());
        adapter
            .insert_forecasts(&[open("a", "2330", None), done, open("c", "2330", None)])
            .unwrap();

        let ids: Vec<String> = adapter
            .list_open()
            .unwrap()
            .into_iter()
            .map(|l| l.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn resolve_if_open_applies_once() {
        let adapter = adapter();
        adapter.insert_forecasts(&[open("a", "2330", None)]).unwrap();

        assert!(adapter.resolve_if_open("a", &resolution()).unwrap());

        let mut later = resolution();
        later.end_price = 90.0;
        later.outcome = Outcome::Fail;
        later.resolved_at = later.resolved_at + chrono::Duration::hours(2);
        assert!(!adapter.resolve_if_open("a", &later).unwrap());

        let stored = adapter.find("a").unwrap().unwrap().unwrap();
        assert_eq!(stored.status, Status::Resolved(resolution()));
    }

    #[test]
    fn update_current_price_records_time() {
        let adapter = adapter();
        adapter.insert_forecasts(&[open("a", "2330", None)]).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap();

        assert!(adapter.update_current_price("a", 104.5, at).unwrap());

        let stored = adapter.find("a").unwrap().unwrap().unwrap();
        assert_eq!(stored.current_price, Some(104.5));
        assert!(stored.status.is_open());
        assert_eq!(
            adapter.current_price_updated_at("a").unwrap().as_deref(),
            Some("2024-03-04T02:00:00.000Z")
        );
    }

    #[test]
    fn update_current_price_unknown_id() {
        let adapter = adapter();
        assert!(!adapter.update_current_price("ghost", 1.0, Utc::now()).unwrap());
    }

    #[test]
    fn update_current_price_leaves_resolved_row_alone() {
        let adapter = adapter();
        let mut done = open("a", "2330", None);
        done.current_price = Some(130.0);
        done.status = Status::Resolved(resolution());
        adapter.insert_forecasts(&[done.clone()]).unwrap();

        let at = Utc.with_ymd_and_hms(2024, 3, 5, 2, 0, 0).unwrap();
        assert!(!adapter.update_current_price("a", 88.0, at).unwrap());

        assert_eq!(adapter.find("a").unwrap().unwrap().unwrap(), done);
        assert_eq!(adapter.current_price_updated_at("a").unwrap(), None);
    }

    #[test]
    fn children_filtered_by_parent_and_status() {
        let adapter = adapter();
        let mut closed_child = open("c2", "2330", Some("p"));
        closed_child.status = Status::Resolved(resolution());
        adapter
            .insert_forecasts(&[
                open("p", "2330", None),
                open("c1", "2330", Some("p")),
                closed_child,
                open("x", "2330", Some("other")),
            ])
            .unwrap();

        let children: Vec<String> = adapter
            .list_open_children("p")
            .unwrap()
            .into_iter()
            .map(|l| l.unwrap().id)
            .collect();
        assert_eq!(children, vec!["c1"]);
    }

    #[test]
    fn malformed_rows_are_quarantined_not_fatal() {
        let adapter = adapter();
        adapter.insert_forecasts(&[open("good", "2330", None)]).unwrap();
        adapter
            .execute_batch(
                "INSERT INTO forecasts (id, ticker, direction, floor, ceiling, start_price, confidence, status)
                 VALUES ('bad', '2330', 'up', 130, 120, 100, 3, 'pending');",
            )
            .unwrap();

        let loaded = adapter.list_open().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].is_ok());
        let bad = loaded[1].as_ref().unwrap_err();
        assert_eq!(bad.id, "bad");
    }

    #[test]
    fn legacy_text_prices_are_normalized() {
        let adapter = adapter();
        adapter
            .execute_batch(
                "INSERT INTO forecasts (id, ticker, direction, floor, ceiling, start_price, confidence, status)
                 VALUES ('legacy', '2330', '-1', '1,000', '1,200', '1,100-1,110', '4', 'pending');",
            )
            .unwrap();

        let f = adapter.find("legacy").unwrap().unwrap().unwrap();
        assert_eq!(f.direction, Direction::Down);
        assert_eq!(f.floor, 1000.0);
        assert_eq!(f.ceiling, 1200.0);
        assert_eq!(f.start_price, 1100.0);
        assert_eq!(f.confidence, 4);
    }

    #[test]
    fn find_missing_returns_none() {
        assert!(adapter().find("nope").unwrap().is_none());
    }
}
