use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    error::{AppError, Result},
    services::lobby_status::{resolve_status, LobbyStatus, StoredStatus},
    tokenomics::{platform_fee, prize_pool_from_fees, total_entry_fees},
    utils::decimal_to_units,
};

// ==================== LOBBY ====================
/// A lobby row with its live participant count.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lobby {
    pub id: i64,
    pub name: String,
    pub entry_fee: Decimal,
    pub start_time: DateTime<Utc>,
    pub interval_seconds: i64,
    pub max_participants: i32,
    pub current_participants: i64,
    pub status: String,
    pub prizes_distributed: bool,
    pub created_at: DateTime<Utc>,
}

impl Lobby {
    /// Unknown values in the status column fall back to `open`.
    pub fn stored_status(&self) -> StoredStatus {
        self.status.parse().unwrap_or_else(|err| {
            tracing::warn!("Lobby {}: {}; treating as open", self.id, err);
            StoredStatus::default()
        })
    }

    pub fn resolve_status(&self, now: DateTime<Utc>) -> LobbyStatus {
        resolve_status(
            self.start_time,
            u64::try_from(self.interval_seconds).unwrap_or(0),
            u32::try_from(self.current_participants).unwrap_or(u32::MAX),
            u32::try_from(self.max_participants).unwrap_or(0),
            self.stored_status(),
            now,
        )
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        chrono::Duration::try_seconds(self.interval_seconds.max(0))
            .and_then(|interval| self.start_time.checked_add_signed(interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn entry_fee_units(&self) -> Result<u128> {
        decimal_to_units(self.entry_fee)
    }

    /// Prize pool for `participants` paid entries after the platform fee.
    pub fn prize_pool(&self, participants: u64, platform_fee_bps: u32) -> Result<u128> {
        let fees = total_entry_fees(self.entry_fee_units()?, participants)
            .ok_or(AppError::AmountOverflow)?;
        Ok(prize_pool_from_fees(fees, platform_fee_bps))
    }

    /// Platform's cut of the entry fees collected from `participants`.
    pub fn platform_fee(&self, participants: u64, platform_fee_bps: u32) -> Result<u128> {
        let fees = total_entry_fees(self.entry_fee_units()?, participants)
            .ok_or(AppError::AmountOverflow)?;
        Ok(platform_fee(fees, platform_fee_bps))
    }

    pub fn participant_count(&self) -> u64 {
        u64::try_from(self.current_participants).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct NewLobby {
    pub name: String,
    pub entry_fee: Decimal,
    pub start_time: DateTime<Utc>,
    pub interval_seconds: i64,
    pub max_participants: i32,
}

// ==================== PARTICIPANT ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Participant {
    pub lobby_id: i64,
    pub user_address: String,
    pub tokens: Vec<String>,
    pub score: f64,
    pub joined_at: DateTime<Utc>,
    pub final_rank: Option<i64>,
    pub prize_amount: Option<Decimal>,
}

#[cfg(test)]
pub(crate) fn sample_lobby(now: DateTime<Utc>) -> Lobby {
    Lobby {
        id: 1,
        name: "Weekly majors".to_string(),
        entry_fee: Decimal::from(100),
        start_time: now - chrono::Duration::hours(2),
        interval_seconds: 3_600,
        max_participants: 20,
        current_participants: 10,
        status: "active".to_string(),
        prizes_distributed: false,
        created_at: now - chrono::Duration::days(1),
    }
}
