use super::{
    store::{ProxyStore, ReleaseUpdate, SelectFilter, StaleClaim, StoreError},
    types::{NewProxy, PoolSummary, Proxy, ProxyStatus},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::path::Path;

/// Schema for the `proxies` table. Timestamps are Unix milliseconds.
pub const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS proxies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        username TEXT,
        password TEXT,
        protocol TEXT NOT NULL,
        country TEXT,
        timezone TEXT,
        latency_ms INTEGER,
        health_quality REAL,
        success_count INTEGER NOT NULL DEFAULT 0,
        fail_count INTEGER NOT NULL DEFAULT 0,
        usage_count INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'testing',
        in_use INTEGER NOT NULL DEFAULT 0,
        in_use_since INTEGER,
        cooldown_until INTEGER,
        last_used_at INTEGER,
        UNIQUE(host, port, username)
    );

    CREATE INDEX IF NOT EXISTS idx_proxies_selectable ON proxies(status, in_use, cooldown_until);
    CREATE INDEX IF NOT EXISTS idx_proxies_in_use_since ON proxies(in_use, in_use_since);
";

const COLUMNS: &str = "id, host, port, username, password, protocol, country, timezone, \
    latency_ms, health_quality, success_count, fail_count, usage_count, status, in_use, \
    in_use_since, cooldown_until, last_used_at";

/// `SQLite`-backed proxy pool.
pub struct SqliteProxyStore {
    pool: Pool<Sqlite>,
}

impl SqliteProxyStore {
    /// Connects to `database_url` and creates the schema if missing.
    ///
    /// In-memory databases are pinned to a single long-lived connection, since every
    /// `SQLite` connection to `:memory:` opens a separate database.
    ///
    /// # Errors
    /// Returns `StoreError::Database` if the connection or migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let in_memory = database_url.contains(":memory:");

        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            Self::ensure_parent_dir(database_url).await?;
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = options.connect(database_url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Creates the `proxies` table and indexes.
    ///
    /// # Errors
    /// Returns `StoreError::Database` on SQL failure.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_parent_dir(database_url: &str) -> Result<(), StoreError> {
        let Some(rest) = database_url.strip_prefix("sqlite://") else {
            return Ok(());
        };
        let path = rest.split('?').next().unwrap_or(rest);
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Database(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        Ok(())
    }

    fn get_required<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
    {
        row.try_get::<T, _>(column)
            .map_err(|e| StoreError::Corrupt(format!("column '{column}': {e}")))
    }

    fn get_u64(row: &SqliteRow, column: &str) -> Result<u64, StoreError> {
        let value: i64 = Self::get_required(row, column)?;
        u64::try_from(value)
            .map_err(|e| StoreError::Corrupt(format!("column '{column}' value {value}: {e}")))
    }

    fn get_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let millis: Option<i64> = Self::get_required(row, column)?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }

    fn row_to_proxy(row: &SqliteRow) -> Result<Proxy, StoreError> {
        let port: i64 = Self::get_required(row, "port")?;
        let protocol: String = Self::get_required(row, "protocol")?;
        let status: String = Self::get_required(row, "status")?;
        let latency: Option<i64> = Self::get_required(row, "latency_ms")?;

        Ok(Proxy {
            id: Self::get_required(row, "id")?,
            host: Self::get_required(row, "host")?,
            port: u16::try_from(port)
                .map_err(|e| StoreError::Corrupt(format!("port {port}: {e}")))?,
            username: Self::get_required(row, "username")?,
            password: Self::get_required(row, "password")?,
            protocol: protocol.parse().map_err(StoreError::Corrupt)?,
            country: Self::get_required(row, "country")?,
            timezone: Self::get_required(row, "timezone")?,
            latency_ms: latency.and_then(|v| u64::try_from(v).ok()),
            health_quality: Self::get_required(row, "health_quality")?,
            success_count: Self::get_u64(row, "success_count")?,
            fail_count: Self::get_u64(row, "fail_count")?,
            usage_count: Self::get_u64(row, "usage_count")?,
            status: status.parse().map_err(StoreError::Corrupt)?,
            in_use: Self::get_required::<i64>(row, "in_use")? != 0,
            in_use_since: Self::get_timestamp(row, "in_use_since")?,
            cooldown_until: Self::get_timestamp(row, "cooldown_until")?,
            last_used_at: Self::get_timestamp(row, "last_used_at")?,
        })
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl ProxyStore for SqliteProxyStore {
    async fn find_selectable(&self, filter: &SelectFilter) -> Result<Vec<Proxy>, StoreError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {COLUMNS}
            FROM proxies
            WHERE status IN ('live', 'testing')
              AND in_use = 0
              AND (cooldown_until IS NULL OR cooldown_until <= ?)
              AND (health_quality IS NULL OR health_quality >= ?)
            ORDER BY id
            "
        ))
        .bind(filter.now.timestamp_millis())
        .bind(filter.min_health_quality)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::row_to_proxy)
            .filter(|proxy| {
                proxy.as_ref().map_or(true, |p| !filter.exclude_ids.contains(&p.id))
            })
            .collect()
    }

    async fn try_claim(&self, id: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let now_ms = now.timestamp_millis();
        let result = sqlx::query(
            r"
            UPDATE proxies
            SET in_use = 1,
                in_use_since = ?,
                last_used_at = ?,
                usage_count = usage_count + 1
            WHERE id = ?
              AND in_use = 0
              AND status IN ('live', 'testing')
              AND (cooldown_until IS NULL OR cooldown_until <= ?)
            ",
        )
        .bind(now_ms)
        .bind(now_ms)
        .bind(id)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, id: i64, update: &ReleaseUpdate) -> Result<Proxy, StoreError> {
        let fail_delta = to_i64(update.fail_delta);
        let result = sqlx::query(
            r"
            UPDATE proxies
            SET in_use = 0,
                in_use_since = NULL,
                cooldown_until = ?,
                last_used_at = ?,
                success_count = success_count + ?,
                fail_count = fail_count + ?,
                latency_ms = COALESCE(?, latency_ms),
                health_quality = COALESCE(?, health_quality),
                status = CASE
                    WHEN ? > 0 AND status IN ('live', 'testing') AND fail_count + ? >= ?
                        THEN 'quarantine'
                    ELSE status
                END
            WHERE id = ? AND in_use = 1 AND in_use_since = ?
            ",
        )
        .bind(update.cooldown_until.timestamp_millis())
        .bind(update.now.timestamp_millis())
        .bind(to_i64(update.success_delta))
        .bind(fail_delta)
        .bind(update.latency_ms.map(to_i64))
        .bind(update.health_quality)
        .bind(fail_delta)
        .bind(fail_delta)
        .bind(to_i64(update.quarantine_threshold))
        .bind(id)
        .bind(update.claimed_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(_) => Err(StoreError::ClaimLost(id)),
                None => Err(StoreError::NotFound(id)),
            };
        }

        self.get(id).await?.ok_or(StoreError::NotFound(id))
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<StaleClaim>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, in_use_since
            FROM proxies
            WHERE in_use = 1 AND (in_use_since IS NULL OR in_use_since < ?)
            ORDER BY id
            ",
        )
        .bind(cutoff.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        let mut reclaimed = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = Self::get_required(row, "id")?;
            let since: Option<i64> = Self::get_required(row, "in_use_since")?;

            // Per-row compare-and-set: a claim released or renewed since the scan is left alone.
            let result = sqlx::query(
                r"
                UPDATE proxies
                SET in_use = 0, in_use_since = NULL
                WHERE id = ? AND in_use = 1 AND in_use_since IS ?
                ",
            )
            .bind(id)
            .bind(since)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                reclaimed.push(StaleClaim { id, claimed_at: since.and_then(DateTime::from_timestamp_millis) });
            }
        }
        Ok(reclaimed)
    }

    async fn get(&self, id: i64) -> Result<Option<Proxy>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM proxies WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_proxy(&row)).transpose()
    }

    async fn insert(&self, proxy: &NewProxy) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO proxies (host, port, username, password, protocol, country, timezone, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&proxy.host)
        .bind(i64::from(proxy.port))
        .bind(&proxy.username)
        .bind(&proxy.password)
        .bind(proxy.protocol.as_str())
        .bind(&proxy.country)
        .bind(&proxy.timezone)
        .bind(proxy.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn list_all(&self) -> Result<Vec<Proxy>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM proxies ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_proxy).collect()
    }

    async fn reset_quarantine(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE proxies
            SET status = ?, fail_count = 0
            WHERE id = ? AND status = ?
            ",
        )
        .bind(ProxyStatus::Testing.as_str())
        .bind(id)
        .bind(ProxyStatus::Quarantine.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn summary(&self, now: DateTime<Utc>) -> Result<PoolSummary, StoreError> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(status = 'live'), 0) AS live,
                COALESCE(SUM(status = 'testing'), 0) AS testing,
                COALESCE(SUM(status = 'quarantine'), 0) AS quarantine,
                COALESCE(SUM(status = 'blacklisted'), 0) AS blacklisted,
                COALESCE(SUM(in_use = 1), 0) AS in_use,
                COALESCE(SUM(cooldown_until IS NOT NULL AND cooldown_until > ?), 0) AS cooling_down
            FROM proxies
            ",
        )
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(PoolSummary {
            total: Self::get_u64(&row, "total")?,
            live: Self::get_u64(&row, "live")?,
            testing: Self::get_u64(&row, "testing")?,
            quarantine: Self::get_u64(&row, "quarantine")?,
            blacklisted: Self::get_u64(&row, "blacklisted")?,
            in_use: Self::get_u64(&row, "in_use")?,
            cooling_down: Self::get_u64(&row, "cooling_down")?,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
