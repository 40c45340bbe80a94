use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgExecutor, PgPool, Postgres, Transaction};

use crate::{
    config::Config,
    error::{AppError, Result},
    models::{Balance, Lobby, NewLobby, Participant},
    services::{
        lobby_status::{can_create_team, StoredStatus},
        settlement::{Payout, PayoutLedger, PayoutPlan, Standing},
        status_sync::LobbyFeed,
    },
    utils::units_to_decimal,
};

const LOBBY_COLUMNS: &str = "l.id, l.name, l.entry_fee, l.start_time, l.interval_seconds,
    l.max_participants,
    (SELECT COUNT(*) FROM participants p WHERE p.lobby_id = l.id) AS current_participants,
    l.status, l.prizes_distributed, l.created_at";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ==================== USER / BALANCE QUERIES ====================
impl Database {
    pub async fn get_balance(&self, address: &str) -> Result<Option<Balance>> {
        let balance = sqlx::query_as::<_, Balance>(
            "SELECT user_address, amount, updated_at FROM balances WHERE user_address = $1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance)
    }

    /// Credit a verified deposit and return the new balance.
    pub async fn credit_balance(&self, address: &str, amount: Decimal) -> Result<Decimal> {
        let mut tx = self.pool.begin().await?;
        create_user_in_tx(&mut tx, address).await?;
        let balance = credit_in_tx(&mut tx, address, amount).await?;
        tx.commit().await?;
        Ok(balance)
    }
}

async fn create_user_in_tx(tx: &mut Transaction<'_, Postgres>, address: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (address) VALUES ($1)
         ON CONFLICT DO NOTHING",
    )
    .bind(address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn credit_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    address: &str,
    amount: Decimal,
) -> Result<Decimal> {
    let balance = sqlx::query_scalar::<_, Decimal>(
        r#"
        INSERT INTO balances (user_address, amount)
        VALUES ($1, $2)
        ON CONFLICT (user_address) DO UPDATE
        SET amount     = balances.amount + EXCLUDED.amount,
            updated_at = NOW()
        RETURNING amount
        "#,
    )
    .bind(address)
    .bind(amount)
    .fetch_one(&mut **tx)
    .await?;
    Ok(balance)
}

// ==================== LOBBY QUERIES ====================
impl Database {
    pub async fn create_lobby(&self, lobby: &NewLobby) -> Result<Lobby> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO lobbies (name, entry_fee, start_time, interval_seconds, max_participants)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&lobby.name)
        .bind(lobby.entry_fee)
        .bind(lobby.start_time)
        .bind(lobby.interval_seconds)
        .bind(lobby.max_participants)
        .fetch_one(&self.pool)
        .await?;

        self.get_lobby(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Lobby {} vanished after insert", id)))
    }

    pub async fn get_lobby(&self, id: i64) -> Result<Option<Lobby>> {
        let lobby = sqlx::query_as::<_, Lobby>(&format!(
            "SELECT {} FROM lobbies l WHERE l.id = $1",
            LOBBY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lobby)
    }

    pub async fn list_lobbies(&self, limit: i64, offset: i64) -> Result<Vec<Lobby>> {
        let lobbies = sqlx::query_as::<_, Lobby>(&format!(
            "SELECT {} FROM lobbies l ORDER BY l.start_time DESC, l.id DESC LIMIT $1 OFFSET $2",
            LOBBY_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(lobbies)
    }

    pub async fn count_lobbies(&self) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lobbies")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Manual override. Refused once prizes have been paid.
    pub async fn close_lobby(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE lobbies SET status = 'closed' WHERE id = $1 AND prizes_distributed = false",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_lobby(id).await? {
                Some(_) => Err(AppError::AlreadyDistributed(id)),
                None => Err(AppError::NotFound(format!("Lobby {} not found", id))),
            };
        }
        Ok(())
    }
}

// ==================== PARTICIPANT QUERIES ====================
impl Database {
    /// Join a lobby: re-check the lobby under a row lock, debit the entry
    /// fee and store the team, all in one transaction.
    pub async fn join_lobby(
        &self,
        lobby_id: i64,
        address: &str,
        tokens: &[String],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Participant> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, i64>("SELECT id FROM lobbies WHERE id = $1 FOR UPDATE")
            .bind(lobby_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::NotFound(format!("Lobby {} not found", lobby_id)));
        }

        let lobby = sqlx::query_as::<_, Lobby>(&format!(
            "SELECT {} FROM lobbies l WHERE l.id = $1",
            LOBBY_COLUMNS
        ))
        .bind(lobby_id)
        .fetch_one(&mut *tx)
        .await?;

        let status = lobby.resolve_status(now);
        if !can_create_team(status) {
            return Err(AppError::LobbyNotJoinable(status.to_string()));
        }

        create_user_in_tx(&mut tx, address).await?;

        let already_joined = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM participants WHERE lobby_id = $1 AND user_address = $2)",
        )
        .bind(lobby_id)
        .bind(address)
        .fetch_one(&mut *tx)
        .await?;
        if already_joined {
            return Err(AppError::BadRequest("Already joined this lobby".to_string()));
        }

        let debited = sqlx::query(
            "UPDATE balances SET amount = amount - $2, updated_at = NOW()
             WHERE user_address = $1 AND amount >= $2",
        )
        .bind(address)
        .bind(lobby.entry_fee)
        .execute(&mut *tx)
        .await?;
        if debited.rows_affected() == 0 && !lobby.entry_fee.is_zero() {
            return Err(AppError::InsufficientBalance);
        }

        let participant = sqlx::query_as::<_, Participant>(
            r#"
            INSERT INTO participants (lobby_id, user_address, tokens, joined_at)
            VALUES ($1, $2, $3, $4)
            RETURNING lobby_id, user_address, tokens, score, joined_at, final_rank, prize_amount
            "#,
        )
        .bind(lobby_id)
        .bind(address)
        .bind(tokens)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if lobby.current_participants + 1 >= i64::from(lobby.max_participants) {
            sqlx::query("UPDATE lobbies SET status = 'full' WHERE id = $1 AND status <> 'closed'")
                .bind(lobby_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(participant)
    }

    /// Participants ordered by score (highest first), then earliest join.
    pub async fn list_participants(&self, lobby_id: i64) -> Result<Vec<Participant>> {
        fetch_participants(&self.pool, lobby_id).await
    }

    /// Record scores for a lobby. The lobby row is locked for the whole
    /// write, so a settlement commit sees either all of these scores or none.
    /// Returns how many participants were updated.
    pub async fn record_scores(&self, lobby_id: i64, scores: &[(String, f64)]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let distributed = sqlx::query_scalar::<_, bool>(
            "SELECT prizes_distributed FROM lobbies WHERE id = $1 FOR UPDATE",
        )
        .bind(lobby_id)
        .fetch_optional(&mut *tx)
        .await?;
        match distributed {
            None => return Err(AppError::NotFound(format!("Lobby {} not found", lobby_id))),
            Some(true) => return Err(AppError::AlreadyDistributed(lobby_id)),
            Some(false) => {}
        }

        let mut updated = 0;
        for (address, score) in scores {
            let result = sqlx::query(
                "UPDATE participants SET score = $1 WHERE lobby_id = $2 AND user_address = $3",
            )
            .bind(score)
            .bind(lobby_id)
            .bind(address)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }
}

async fn fetch_participants<'e, E: PgExecutor<'e>>(
    executor: E,
    lobby_id: i64,
) -> Result<Vec<Participant>> {
    let participants = sqlx::query_as::<_, Participant>(
        "SELECT lobby_id, user_address, tokens, score, joined_at, final_rank, prize_amount
         FROM participants
         WHERE lobby_id = $1
         ORDER BY score DESC, joined_at ASC, user_address ASC",
    )
    .bind(lobby_id)
    .fetch_all(executor)
    .await?;
    Ok(participants)
}

// ==================== SETTLEMENT ====================
#[async_trait::async_trait]
impl PayoutLedger for Database {
    async fn load_lobby(&self, lobby_id: i64) -> Result<Option<Lobby>> {
        self.get_lobby(lobby_id).await
    }

    async fn commit_settlement(
        &self,
        lobby_id: i64,
        plan: PayoutPlan<'_>,
    ) -> Result<Option<Vec<Payout>>> {
        let mut tx = self.pool.begin().await?;

        // Joins and score writes take the same lock.
        let locked = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM lobbies
             WHERE id = $1 AND prizes_distributed = false AND status <> 'closed'
             FOR UPDATE",
        )
        .bind(lobby_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let standings = fetch_participants(&mut *tx, lobby_id)
            .await?
            .into_iter()
            .map(|p| Standing {
                user_address: p.user_address,
                score: p.score,
                joined_at: p.joined_at,
            })
            .collect();
        let payouts = plan(standings)?;

        sqlx::query("UPDATE lobbies SET prizes_distributed = true, status = 'ended' WHERE id = $1")
            .bind(lobby_id)
            .execute(&mut *tx)
            .await?;

        for payout in &payouts {
            let amount = units_to_decimal(payout.amount)?;
            let rank = i64::try_from(payout.rank).map_err(|_| AppError::AmountOverflow)?;

            sqlx::query(
                "UPDATE participants SET final_rank = $1, prize_amount = $2
                 WHERE lobby_id = $3 AND user_address = $4",
            )
            .bind(rank)
            .bind(amount)
            .bind(lobby_id)
            .bind(&payout.user_address)
            .execute(&mut *tx)
            .await?;

            if payout.amount > 0 {
                credit_in_tx(&mut tx, &payout.user_address, amount).await?;
            }
        }

        tx.commit().await?;
        Ok(Some(payouts))
    }
}

// ==================== STATUS SYNC ====================
#[async_trait::async_trait]
impl LobbyFeed for Database {
    async fn lobbies_to_refresh(&self, after_id: i64, limit: i64) -> Result<Vec<Lobby>> {
        let lobbies = sqlx::query_as::<_, Lobby>(&format!(
            "SELECT {} FROM lobbies l
             WHERE l.id > $1
               AND l.status NOT IN ('closed', 'ended')
               AND l.prizes_distributed = false
             ORDER BY l.id ASC
             LIMIT $2",
            LOBBY_COLUMNS
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(lobbies)
    }

    async fn lobbies_to_settle(&self, after_id: i64, limit: i64) -> Result<Vec<Lobby>> {
        let lobbies = sqlx::query_as::<_, Lobby>(&format!(
            "SELECT {} FROM lobbies l
             WHERE l.id > $1 AND l.status = 'ended' AND l.prizes_distributed = false
             ORDER BY l.id ASC
             LIMIT $2",
            LOBBY_COLUMNS
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(lobbies)
    }

    /// A `closed` lobby is never overwritten.
    async fn update_lobby_status(&self, id: i64, status: StoredStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE lobbies SET status = $1 WHERE id = $2 AND status <> 'closed' AND status <> $1",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
