use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::Lobby,
    services::{
        lobby_status::LobbyStatus,
        prize_distribution::distribute,
    },
    utils::serialize_units,
};

/// A participant's final standing before ranks are assigned.
#[derive(Debug, Clone)]
pub struct Standing {
    pub user_address: String,
    pub score: f64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payout {
    pub rank: u64,
    pub user_address: String,
    #[serde(serialize_with = "serialize_units")]
    pub amount: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub lobby_id: i64,
    pub participants: u64,
    pub winners: u64,
    #[serde(serialize_with = "serialize_units")]
    pub prize_pool: u128,
    #[serde(serialize_with = "serialize_units")]
    pub platform_fee: u128,
    #[serde(serialize_with = "serialize_units")]
    pub total_paid: u128,
    pub payouts: Vec<Payout>,
}

/// Builds the payouts from the standings read inside the commit.
pub type PayoutPlan<'a> = &'a (dyn Fn(Vec<Standing>) -> Result<Vec<Payout>> + Send + Sync);

/// Storage the settlement workflow reads from and commits to.
#[async_trait::async_trait]
pub trait PayoutLedger: Send + Sync {
    async fn load_lobby(&self, lobby_id: i64) -> Result<Option<Lobby>>;

    /// Lock the lobby, load its standings, run `plan` on them and credit
    /// every payout, all atomically. Returns `None` without writing anything
    /// when the lobby is already distributed or closed.
    async fn commit_settlement(
        &self,
        lobby_id: i64,
        plan: PayoutPlan<'_>,
    ) -> Result<Option<Vec<Payout>>>;
}

/// Order standings by score (highest first), then earliest join.
pub fn rank_participants(standings: &mut [Standing]) {
    standings.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.joined_at.cmp(&b.joined_at))
            .then_with(|| a.user_address.cmp(&b.user_address))
    });
}

/// Rank standings and attach each rank's prize. Non-placing ranks get 0.
pub fn build_payouts(mut standings: Vec<Standing>, prize_pool: u128) -> Vec<Payout> {
    rank_participants(&mut standings);
    let prizes = distribute(standings.len() as u64, prize_pool);

    standings
        .into_iter()
        .enumerate()
        .map(|(idx, standing)| Payout {
            rank: idx as u64 + 1,
            user_address: standing.user_address,
            amount: prizes.get(idx).map(|p| p.prize_amount).unwrap_or(0),
        })
        .collect()
}

/// Settlement Service - Pays out an ended lobby exactly once
pub struct SettlementService<L: PayoutLedger> {
    ledger: L,
    config: Config,
}

impl<L: PayoutLedger> SettlementService<L> {
    pub fn new(ledger: L, config: Config) -> Self {
        Self { ledger, config }
    }

    pub async fn settle(&self, lobby_id: i64, now: DateTime<Utc>) -> Result<SettlementReport> {
        let lobby = self
            .ledger
            .load_lobby(lobby_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lobby {} not found", lobby_id)))?;

        if lobby.prizes_distributed {
            return Err(AppError::AlreadyDistributed(lobby_id));
        }

        let status = lobby.resolve_status(now);
        if status != LobbyStatus::Ended {
            return Err(AppError::LobbyNotEnded(status.to_string()));
        }

        let fee_bps = self.config.platform_fee_bps;
        let plan = |standings: Vec<Standing>| -> Result<Vec<Payout>> {
            let prize_pool = lobby.prize_pool(standings.len() as u64, fee_bps)?;
            Ok(build_payouts(standings, prize_pool))
        };

        let Some(payouts) = self.ledger.commit_settlement(lobby_id, &plan).await? else {
            return Err(self.lost_commit_error(lobby_id, now).await);
        };

        let participants = payouts.len() as u64;
        let prize_pool = lobby.prize_pool(participants, fee_bps)?;
        let platform_fee = lobby.platform_fee(participants, fee_bps)?;
        let total_paid: u128 = payouts.iter().map(|p| p.amount).sum();
        let winners = payouts.iter().filter(|p| p.amount > 0).count() as u64;

        tracing::info!(
            "Lobby {} settled: participants={}, winners={}, pool={}, paid={}",
            lobby_id,
            participants,
            winners,
            prize_pool,
            total_paid
        );

        Ok(SettlementReport {
            lobby_id,
            participants,
            winners,
            prize_pool,
            platform_fee,
            total_paid,
            payouts,
        })
    }

    async fn lost_commit_error(&self, lobby_id: i64, now: DateTime<Utc>) -> AppError {
        match self.ledger.load_lobby(lobby_id).await {
            Ok(Some(lobby)) if lobby.prizes_distributed => AppError::AlreadyDistributed(lobby_id),
            Ok(Some(lobby)) => match lobby.resolve_status(now) {
                LobbyStatus::Ended => {
                    AppError::Internal(format!("Settlement commit for lobby {} was rejected", lobby_id))
                }
                status => AppError::LobbyNotEnded(status.to_string()),
            },
            Ok(None) => AppError::NotFound(format!("Lobby {} not found", lobby_id)),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::lobby::sample_lobby;
    use chrono::Duration;
    use std::sync::Mutex;

    struct MemoryLedger {
        lobby: Mutex<Option<Lobby>>,
        standings: Mutex<Vec<Standing>>,
        committed: Mutex<Vec<Payout>>,
        reject_commit: bool,
        // Score written between the lobby read and the commit.
        late_score: Option<(String, f64)>,
    }

    impl MemoryLedger {
        fn new(lobby: Lobby, standings: Vec<Standing>) -> Self {
            Self {
                lobby: Mutex::new(Some(lobby)),
                standings: Mutex::new(standings),
                committed: Mutex::new(Vec::new()),
                reject_commit: false,
                late_score: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl PayoutLedger for MemoryLedger {
        async fn load_lobby(&self, _lobby_id: i64) -> Result<Option<Lobby>> {
            let lobby = self.lobby.lock().unwrap().clone();
            if let Some((address, score)) = &self.late_score {
                let mut standings = self.standings.lock().unwrap();
                if let Some(standing) = standings.iter_mut().find(|s| &s.user_address == address) {
                    standing.score = *score;
                }
            }
            Ok(lobby)
        }

        async fn commit_settlement(
            &self,
            _lobby_id: i64,
            plan: PayoutPlan<'_>,
        ) -> Result<Option<Vec<Payout>>> {
            let mut guard = self.lobby.lock().unwrap();
            let Some(lobby) = guard.as_mut() else {
                return Ok(None);
            };
            if lobby.prizes_distributed || lobby.status == "closed" || self.reject_commit {
                return Ok(None);
            }
            let payouts = plan(self.standings.lock().unwrap().clone())?;
            lobby.prizes_distributed = true;
            lobby.status = "ended".to_string();
            self.committed.lock().unwrap().extend_from_slice(&payouts);
            Ok(Some(payouts))
        }
    }

    fn standings(now: DateTime<Utc>, n: usize) -> Vec<Standing> {
        (0..n)
            .map(|i| Standing {
                user_address: format!("0x{:040x}", i + 1),
                score: (i % 4) as f64,
                joined_at: now - Duration::minutes(100 - i as i64),
            })
            .collect()
    }

    #[test]
    fn ranking_breaks_ties_by_join_time() {
        let now = Utc::now();
        let mut list = vec![
            Standing { user_address: "c".into(), score: 5.0, joined_at: now },
            Standing { user_address: "a".into(), score: 9.5, joined_at: now },
            Standing { user_address: "b".into(), score: 5.0, joined_at: now - Duration::seconds(10) },
            Standing { user_address: "d".into(), score: -1.0, joined_at: now - Duration::hours(1) },
        ];
        rank_participants(&mut list);
        let order: Vec<&str> = list.iter().map(|s| s.user_address.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn payouts_follow_distribution() {
        let now = Utc::now();
        let payouts = build_payouts(standings(now, 10), 1_000);
        assert_eq!(payouts.len(), 10);
        let amounts: Vec<u128> = payouts.iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![450, 250, 150, 75, 75, 0, 0, 0, 0, 0]);
        for (idx, payout) in payouts.iter().enumerate() {
            assert_eq!(payout.rank, idx as u64 + 1);
        }
    }

    #[test]
    fn payouts_empty_without_participants() {
        assert!(build_payouts(Vec::new(), 1_000).is_empty());
    }

    #[tokio::test]
    async fn settles_ended_lobby_once() {
        let now = Utc::now();
        let lobby = sample_lobby(now);
        let ledger = MemoryLedger::new(lobby, standings(now, 10));
        let service = SettlementService::new(ledger, test_config());

        let report = service.settle(1, now).await.unwrap();
        // 10 entries x 100 minus the 10% platform fee
        assert_eq!(report.prize_pool, 900);
        assert_eq!(report.platform_fee, 100);
        assert_eq!(report.participants, 10);
        assert_eq!(report.winners, 5);
        assert_eq!(report.total_paid, 899);
        assert_eq!(report.payouts[0].amount, 405);
        assert_eq!(service.ledger.committed.lock().unwrap().len(), 10);

        let again = service.settle(1, now).await;
        assert!(matches!(again, Err(AppError::AlreadyDistributed(1))));
        assert_eq!(service.ledger.committed.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn refuses_lobby_that_is_still_live() {
        let now = Utc::now();
        let mut lobby = sample_lobby(now);
        lobby.start_time = now - Duration::minutes(10);
        let service = SettlementService::new(MemoryLedger::new(lobby, standings(now, 4)), test_config());

        match service.settle(1, now).await {
            Err(AppError::LobbyNotEnded(status)) => assert_eq!(status, "live"),
            other => panic!("unexpected result: {:?}", other.map(|r| r.lobby_id)),
        }
        assert!(service.ledger.committed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refuses_closed_lobby() {
        let now = Utc::now();
        let mut lobby = sample_lobby(now);
        lobby.status = "closed".to_string();
        let service = SettlementService::new(MemoryLedger::new(lobby, standings(now, 4)), test_config());

        assert!(matches!(
            service.settle(1, now).await,
            Err(AppError::LobbyNotEnded(status)) if status == "closed"
        ));
    }

    #[tokio::test]
    async fn missing_lobby_is_not_found() {
        let now = Utc::now();
        let ledger = MemoryLedger {
            lobby: Mutex::new(None),
            standings: Mutex::new(Vec::new()),
            committed: Mutex::new(Vec::new()),
            reject_commit: false,
            late_score: None,
        };
        let service = SettlementService::new(ledger, test_config());
        assert!(matches!(service.settle(9, now).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn lost_commit_reports_current_state() {
        let now = Utc::now();
        let mut ledger = MemoryLedger::new(sample_lobby(now), standings(now, 6));
        ledger.reject_commit = true;
        let service = SettlementService::new(ledger, test_config());

        assert!(matches!(service.settle(1, now).await, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn ranks_by_scores_present_at_commit() {
        let now = Utc::now();
        let field = standings(now, 4);
        let underdog = field[0].user_address.clone();
        let mut ledger = MemoryLedger::new(sample_lobby(now), field);
        ledger.late_score = Some((underdog.clone(), 100.0));
        let service = SettlementService::new(ledger, test_config());

        let report = service.settle(1, now).await.unwrap();
        assert_eq!(report.payouts[0].user_address, underdog);
        assert_eq!(report.payouts[0].rank, 1);
        assert_eq!(service.ledger.committed.lock().unwrap()[0].user_address, underdog);
    }
}
