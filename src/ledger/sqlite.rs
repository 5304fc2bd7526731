//! SQLite swap ledger

use super::{SwapLedger, TransitionRecord};
use crate::config::DatabaseConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::swap::{Swap, SwapState};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Ledger backed by a SQLite database.
///
/// A swap is stored as one JSON record per row, so every save replaces the
/// whole record inside a single transaction.
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (creating if needed) the database and run migrations
    pub async fn new(config: &DatabaseConfig) -> CoordinatorResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Create tables inline
    pub async fn run_migrations(&self) -> CoordinatorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS swaps (
                swap_id TEXT PRIMARY KEY,
                order_hash TEXT UNIQUE,
                state TEXT NOT NULL,
                record TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_swaps_state
            ON swaps (state)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS swap_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                swap_id TEXT NOT NULL,
                from_state TEXT,
                to_state TEXT NOT NULL,
                reason TEXT,
                recorded_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_transitions_swap
            ON swap_transitions (swap_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Ledger migrations complete");
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> CoordinatorResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn write_record(conn: &mut SqliteConnection, swap: &Swap) -> CoordinatorResult<()> {
        let record = serde_json::to_string(swap)?;

        sqlx::query(
            r#"
            INSERT INTO swaps (swap_id, order_hash, state, record, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (swap_id)
            DO UPDATE SET order_hash = excluded.order_hash,
                          state = excluded.state,
                          record = excluded.record,
                          updated_at = excluded.updated_at
            "#,
        )
        .bind(swap.swap_id.to_string())
        .bind(swap.order_hash.as_deref())
        .bind(swap.state.as_str())
        .bind(record)
        .bind(swap.created_at.timestamp_millis())
        .bind(swap.updated_at.timestamp_millis())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn append_transition(
        conn: &mut SqliteConnection,
        swap: &Swap,
        from: Option<SwapState>,
    ) -> CoordinatorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO swap_transitions (swap_id, from_state, to_state, reason, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(swap.swap_id.to_string())
        .bind(from.map(|s| s.as_str()))
        .bind(swap.state.as_str())
        .bind(swap.last_error.as_deref())
        .bind(swap.updated_at.timestamp_millis())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    fn decode(row: &SqliteRow) -> CoordinatorResult<Swap> {
        let swap_id: String = row.try_get("swap_id")?;
        let state: String = row.try_get("state")?;
        let record: String = row.try_get("record")?;

        let inconsistent = |message: String| CoordinatorError::LedgerInconsistency {
            swap_id: swap_id.clone(),
            message,
        };

        let swap: Swap = serde_json::from_str(&record)
            .map_err(|e| inconsistent(format!("unreadable record: {}", e)))?;

        if swap.swap_id.to_string() != swap_id {
            return Err(inconsistent(format!(
                "record belongs to swap {}",
                swap.swap_id
            )));
        }
        if swap.state.as_str() != state {
            return Err(inconsistent(format!(
                "state column {} disagrees with record state {}",
                state, swap.state
            )));
        }
        swap.check_invariants().map_err(inconsistent)?;

        Ok(swap)
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[async_trait]
impl SwapLedger for SqliteLedger {
    async fn save(&self, swap: &Swap) -> CoordinatorResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::write_record(&mut tx, swap).await?;
        tx.commit().await?;

        debug!(swap_id = %swap.swap_id, state = %swap.state, "Saved swap");
        Ok(())
    }

    async fn commit_transition(
        &self,
        swap: &Swap,
        from: Option<SwapState>,
    ) -> CoordinatorResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::write_record(&mut tx, swap).await?;
        Self::append_transition(&mut tx, swap, from).await?;
        tx.commit().await?;

        debug!(
            swap_id = %swap.swap_id,
            from = ?from,
            to = %swap.state,
            "Recorded transition"
        );
        Ok(())
    }

    async fn load(&self, key: &str) -> CoordinatorResult<Swap> {
        let row = sqlx::query(
            "SELECT swap_id, state, record FROM swaps WHERE order_hash = ?1 OR swap_id = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::decode(&row),
            None => Err(CoordinatorError::NotFound(key.to_string())),
        }
    }

    async fn list_incomplete(&self) -> CoordinatorResult<Vec<Swap>> {
        let rows = sqlx::query(
            r#"
            SELECT swap_id, state, record FROM swaps
            WHERE state NOT IN ('settled', 'expired', 'failed')
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut swaps = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::decode(row) {
                Ok(swap) => swaps.push(swap),
                Err(e) => {
                    // Left in place for an operator; never resumed automatically
                    error!("Skipping swap during recovery: {}", e);
                    crate::metrics::record_ledger_inconsistency();
                }
            }
        }

        Ok(swaps)
    }

    async fn history(&self, swap_id: Uuid) -> CoordinatorResult<Vec<TransitionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT from_state, to_state, reason, recorded_at
            FROM swap_transitions
            WHERE swap_id = ?1
            ORDER BY id
            "#,
        )
        .bind(swap_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> CoordinatorResult<TransitionRecord> {
                let from: Option<String> = row.try_get("from_state")?;
                let to: String = row.try_get("to_state")?;
                Ok(TransitionRecord {
                    swap_id,
                    from: from.map(|s| s.parse()).transpose()?,
                    to: to.parse()?,
                    reason: row.try_get("reason")?,
                    recorded_at: from_millis(row.try_get("recorded_at")?),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::record::fixtures::{built_swap, quoted_swap};
    use crate::testing::open_ledger;

    fn submitted(mut swap: Swap, order_hash: &str) -> Swap {
        swap.order_hash = Some(order_hash.to_string());
        swap.transition(SwapState::Submitted, Utc::now()).unwrap();
        swap.transition(SwapState::AwaitingFills, Utc::now()).unwrap();
        swap
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let (_dir, ledger) = open_ledger().await;
        let swap = built_swap(3);

        ledger.save(&swap).await.unwrap();
        let loaded = ledger.load(&swap.swap_id.to_string()).await.unwrap();
        assert_eq!(loaded, swap);

        // Upsert under the same id, now reachable by order hash as well
        let swap = submitted(swap, "0xfeed");
        ledger.save(&swap).await.unwrap();
        ledger.save(&swap).await.unwrap();
        assert_eq!(ledger.load("0xfeed").await.unwrap(), swap);
        assert_eq!(ledger.load(&swap.swap_id.to_string()).await.unwrap(), swap);
    }

    #[tokio::test]
    async fn test_load_missing_swap() {
        let (_dir, ledger) = open_ledger().await;
        assert!(matches!(
            ledger.load("0xmissing").await,
            Err(CoordinatorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_interrupted_save_keeps_previous_record() {
        let (_dir, ledger) = open_ledger().await;
        let original = built_swap(2);
        ledger.save(&original).await.unwrap();

        let updated = submitted(original.clone(), "0xbeef");
        {
            let mut tx = ledger.pool.begin().await.unwrap();
            SqliteLedger::write_record(&mut tx, &updated).await.unwrap();
            // Crash before commit: the transaction is dropped and rolled back
        }

        let loaded = ledger.load(&original.swap_id.to_string()).await.unwrap();
        assert_eq!(loaded, original);
        assert!(matches!(
            ledger.load("0xbeef").await,
            Err(CoordinatorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_incomplete_excludes_terminal() {
        let (_dir, ledger) = open_ledger().await;

        let live = submitted(built_swap(1), "0x01");
        let mut failed = quoted_swap(1);
        failed.transition(SwapState::Failed, Utc::now()).unwrap();
        let quoted = quoted_swap(2);

        for swap in [&live, &failed, &quoted] {
            ledger.save(swap).await.unwrap();
        }

        let incomplete = ledger.list_incomplete().await.unwrap();
        let ids: Vec<Uuid> = incomplete.iter().map(|s| s.swap_id).collect();
        assert_eq!(incomplete.len(), 2);
        assert!(ids.contains(&live.swap_id));
        assert!(ids.contains(&quoted.swap_id));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let (_dir, ledger) = open_ledger().await;
        let mut swap = built_swap(2);
        swap.secret_hashes.reverse();

        ledger.save(&swap).await.unwrap();
        let err = ledger.load(&swap.swap_id.to_string()).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(ledger.list_incomplete().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transition_history_is_appended() {
        let (_dir, ledger) = open_ledger().await;
        let mut swap = quoted_swap(1);
        ledger.commit_transition(&swap, None).await.unwrap();

        swap.transition(SwapState::Failed, Utc::now()).unwrap();
        swap.last_error = Some("preset missing".to_string());
        ledger
            .commit_transition(&swap, Some(SwapState::Quoted))
            .await
            .unwrap();

        let history = ledger.history(swap.swap_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].from, None);
        assert_eq!(history[0].to, SwapState::Quoted);
        assert_eq!(history[1].from, Some(SwapState::Quoted));
        assert_eq!(history[1].to, SwapState::Failed);
        assert_eq!(history[1].reason.as_deref(), Some("preset missing"));
    }
}
