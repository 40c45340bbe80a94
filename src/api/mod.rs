// src/api/mod.rs

pub mod admin;
pub mod balance;
pub mod health;
pub mod lobbies;
pub mod prizes;

use serde::Serialize;

use crate::config::Config;
use crate::db::Database;
use crate::services::prize_distribution::PrizeEntry;
use crate::utils::serialize_units;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

#[derive(Debug, Serialize)]
pub struct PrizeEntryResponse {
    pub rank: u64,
    #[serde(serialize_with = "serialize_units")]
    pub prize_amount: u128,
    pub percentage: f64,
}

impl From<PrizeEntry> for PrizeEntryResponse {
    fn from(entry: PrizeEntry) -> Self {
        Self {
            rank: entry.rank,
            prize_amount: entry.prize_amount,
            percentage: entry.percentage,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DistributionResponse {
    pub participants: u64,
    #[serde(serialize_with = "serialize_units")]
    pub prize_pool: u128,
    pub winners_count: u64,
    #[serde(serialize_with = "serialize_units")]
    pub total_distributed: u128,
    pub entries: Vec<PrizeEntryResponse>,
}

impl DistributionResponse {
    pub fn new(participants: u64, prize_pool: u128, entries: Vec<PrizeEntry>) -> Self {
        let total_distributed = entries.iter().map(|e| e.prize_amount).sum();
        Self {
            participants,
            prize_pool,
            winners_count: entries.len() as u64,
            total_distributed,
            entries: entries.into_iter().map(PrizeEntryResponse::from).collect(),
        }
    }
}
