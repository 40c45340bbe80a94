use crate::{
    config::Config,
    constants::STATUS_SYNC_BATCH_SIZE,
    error::Result,
    models::Lobby,
    services::{
        lobby_status::StoredStatus,
        settlement::{PayoutLedger, SettlementService},
    },
};
use chrono::{DateTime, Utc};
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use tokio::time::{interval, Duration};

/// Lobby queries the status sync pages through.
#[async_trait::async_trait]
pub trait LobbyFeed: PayoutLedger + Clone {
    /// Lobbies with `id > after_id` whose stored status may still change:
    /// not `closed`, not `ended`, not distributed. Ordered by id.
    async fn lobbies_to_refresh(&self, after_id: i64, limit: i64) -> Result<Vec<Lobby>>;

    /// Lobbies with `id > after_id` stored as `ended` and not yet
    /// distributed. Ordered by id.
    async fn lobbies_to_settle(&self, after_id: i64, limit: i64) -> Result<Vec<Lobby>>;

    async fn update_lobby_status(&self, id: i64, status: StoredStatus) -> Result<bool>;
}

/// Status Sync - Persists derived lobby statuses and settles ended lobbies
pub struct StatusSync<F: LobbyFeed> {
    feed: F,
    settlement: SettlementService<F>,
    config: Config,
    batch_size: i64,
    refresh_cursor: AtomicI64,
    settle_cursor: AtomicI64,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub scanned: usize,
    pub updated: usize,
    pub settled: usize,
}

/// The stored status a lobby should move to, if it differs from the row.
pub fn next_stored_status(lobby: &Lobby, now: DateTime<Utc>) -> Option<StoredStatus> {
    let current = lobby.stored_status();
    if current.is_terminal() {
        return None;
    }
    let next = StoredStatus::from(lobby.resolve_status(now));
    (next != current).then_some(next)
}

/// Where the next pass starts: after the last lobby of a full batch, or back
/// at the beginning once a short batch shows the end was reached.
fn next_cursor(batch: &[Lobby], limit: i64) -> i64 {
    match batch.last() {
        Some(last) if batch.len() as i64 >= limit => last.id,
        _ => 0,
    }
}

impl<F: LobbyFeed + 'static> StatusSync<F> {
    pub fn new(feed: F, config: Config) -> Self {
        Self {
            settlement: SettlementService::new(feed.clone(), config.clone()),
            feed,
            config,
            batch_size: STATUS_SYNC_BATCH_SIZE,
            refresh_cursor: AtomicI64::new(0),
            settle_cursor: AtomicI64::new(0),
        }
    }

    /// Start status sync loop
    pub async fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.config.status_sync_interval_secs));

            loop {
                ticker.tick().await;

                match self.sync_once(Utc::now()).await {
                    Ok(summary) if summary.updated > 0 || summary.settled > 0 => {
                        tracing::info!(
                            "Status sync: scanned={}, updated={}, settled={}",
                            summary.scanned,
                            summary.updated,
                            summary.settled
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Status sync error: {}", e),
                }
            }
        });
    }

    async fn sync_once(&self, now: DateTime<Utc>) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        let after = self.refresh_cursor.load(Ordering::Relaxed);
        let batch = self.feed.lobbies_to_refresh(after, self.batch_size).await?;
        self.refresh_cursor
            .store(next_cursor(&batch, self.batch_size), Ordering::Relaxed);
        summary.scanned += batch.len();

        for lobby in &batch {
            if let Some(next) = next_stored_status(lobby, now) {
                if self.feed.update_lobby_status(lobby.id, next).await? {
                    tracing::debug!("Lobby {}: {} -> {}", lobby.id, lobby.status, next);
                    summary.updated += 1;
                }
            }
        }

        if !self.config.enable_auto_settlement {
            return Ok(summary);
        }

        // Lobbies that keep failing are skipped by the cursor until it wraps.
        let after = self.settle_cursor.load(Ordering::Relaxed);
        let batch = self.feed.lobbies_to_settle(after, self.batch_size).await?;
        self.settle_cursor
            .store(next_cursor(&batch, self.batch_size), Ordering::Relaxed);
        summary.scanned += batch.len();

        for lobby in &batch {
            match self.settlement.settle(lobby.id, now).await {
                Ok(_) => summary.settled += 1,
                Err(e) => tracing::warn!("Auto settlement of lobby {} failed: {}", lobby.id, e),
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::lobby::sample_lobby;
    use crate::services::settlement::{Payout, PayoutPlan};
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct MemoryFeed {
        lobbies: Arc<Mutex<Vec<Lobby>>>,
        broken: Arc<HashSet<i64>>,
    }

    impl MemoryFeed {
        fn with(lobbies: Vec<Lobby>) -> Self {
            Self {
                lobbies: Arc::new(Mutex::new(lobbies)),
                ..Self::default()
            }
        }

        fn status_of(&self, id: i64) -> String {
            self.lobbies
                .lock()
                .unwrap()
                .iter()
                .find(|l| l.id == id)
                .map(|l| l.status.clone())
                .unwrap()
        }

        fn page(&self, after_id: i64, limit: i64, keep: impl Fn(&Lobby) -> bool) -> Vec<Lobby> {
            let mut lobbies: Vec<Lobby> = self
                .lobbies
                .lock()
                .unwrap()
                .iter()
                .filter(|l| l.id > after_id && !l.prizes_distributed && keep(l))
                .cloned()
                .collect();
            lobbies.sort_by_key(|l| l.id);
            lobbies.truncate(limit as usize);
            lobbies
        }
    }

    #[async_trait::async_trait]
    impl PayoutLedger for MemoryFeed {
        async fn load_lobby(&self, lobby_id: i64) -> Result<Option<Lobby>> {
            Ok(self.lobbies.lock().unwrap().iter().find(|l| l.id == lobby_id).cloned())
        }

        async fn commit_settlement(
            &self,
            lobby_id: i64,
            plan: PayoutPlan<'_>,
        ) -> Result<Option<Vec<Payout>>> {
            if self.broken.contains(&lobby_id) {
                return Ok(None);
            }
            let mut lobbies = self.lobbies.lock().unwrap();
            let Some(lobby) = lobbies.iter_mut().find(|l| l.id == lobby_id) else {
                return Ok(None);
            };
            if lobby.prizes_distributed || lobby.status == "closed" {
                return Ok(None);
            }
            let payouts = plan(Vec::new())?;
            lobby.prizes_distributed = true;
            lobby.status = "ended".to_string();
            Ok(Some(payouts))
        }
    }

    #[async_trait::async_trait]
    impl LobbyFeed for MemoryFeed {
        async fn lobbies_to_refresh(&self, after_id: i64, limit: i64) -> Result<Vec<Lobby>> {
            Ok(self.page(after_id, limit, |l| l.status != "closed" && l.status != "ended"))
        }

        async fn lobbies_to_settle(&self, after_id: i64, limit: i64) -> Result<Vec<Lobby>> {
            Ok(self.page(after_id, limit, |l| l.status == "ended"))
        }

        async fn update_lobby_status(&self, id: i64, status: StoredStatus) -> Result<bool> {
            let mut lobbies = self.lobbies.lock().unwrap();
            match lobbies.iter_mut().find(|l| l.id == id) {
                Some(lobby) if lobby.status != "closed" && lobby.status != status.as_str() => {
                    lobby.status = status.to_string();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    fn lobby(id: i64, status: &str, now: DateTime<Utc>) -> Lobby {
        let mut lobby = sample_lobby(now);
        lobby.id = id;
        lobby.status = status.to_string();
        lobby
    }

    fn live_lobby(id: i64, now: DateTime<Utc>) -> Lobby {
        let mut lobby = lobby(id, "open", now);
        lobby.start_time = now - chrono::Duration::minutes(5);
        lobby
    }

    fn sync(feed: &MemoryFeed, auto_settle: bool, batch_size: i64) -> StatusSync<MemoryFeed> {
        let mut config = test_config();
        config.enable_auto_settlement = auto_settle;
        let mut sync = StatusSync::new(feed.clone(), config);
        sync.batch_size = batch_size;
        sync
    }

    #[test]
    fn live_lobby_is_stored_as_active() {
        let now = Utc::now();
        let mut lobby = sample_lobby(now);
        lobby.status = "open".to_string();
        lobby.start_time = now - chrono::Duration::minutes(1);
        assert_eq!(next_stored_status(&lobby, now), Some(StoredStatus::Active));

        lobby.status = "active".to_string();
        assert_eq!(next_stored_status(&lobby, now), None);
    }

    #[test]
    fn finished_lobby_moves_to_ended() {
        let now = Utc::now();
        let lobby = sample_lobby(now);
        assert_eq!(next_stored_status(&lobby, now), Some(StoredStatus::Ended));
    }

    #[test]
    fn terminal_statuses_are_left_alone() {
        let now = Utc::now();
        let mut lobby = sample_lobby(now);
        lobby.start_time = now + chrono::Duration::hours(3);

        lobby.status = "closed".to_string();
        assert_eq!(next_stored_status(&lobby, now), None);

        lobby.status = "ended".to_string();
        assert_eq!(next_stored_status(&lobby, now), None);
    }

    #[test]
    fn filling_up_is_stored_as_full() {
        let now = Utc::now();
        let mut lobby = sample_lobby(now);
        lobby.status = "open".to_string();
        lobby.start_time = now + chrono::Duration::hours(1);
        lobby.current_participants = i64::from(lobby.max_participants);
        assert_eq!(next_stored_status(&lobby, now), Some(StoredStatus::Full));
    }

    #[test]
    fn cursor_wraps_after_short_batch() {
        let now = Utc::now();
        let batch = vec![lobby(3, "open", now), lobby(7, "open", now)];
        assert_eq!(next_cursor(&batch, 2), 7);
        assert_eq!(next_cursor(&batch, 5), 0);
        assert_eq!(next_cursor(&[], 5), 0);
    }

    #[tokio::test]
    async fn unsettled_ended_lobbies_do_not_starve_newer_ones() {
        let now = Utc::now();
        let mut lobbies: Vec<Lobby> = (1..=5).map(|id| lobby(id, "ended", now)).collect();
        lobbies.push(live_lobby(6, now));
        let feed = MemoryFeed::with(lobbies);
        let sync = sync(&feed, false, 5);

        let summary = sync.sync_once(now).await.unwrap();
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.settled, 0);
        assert_eq!(feed.status_of(6), "active");
        assert_eq!(feed.status_of(1), "ended");
    }

    #[tokio::test]
    async fn refresh_pages_through_every_lobby() {
        let now = Utc::now();
        let feed = MemoryFeed::with((1..=3).map(|id| live_lobby(id, now)).collect());
        let sync = sync(&feed, false, 2);

        let first = sync.sync_once(now).await.unwrap();
        assert_eq!(first.updated, 2);
        assert_eq!(feed.status_of(3), "open");

        let second = sync.sync_once(now).await.unwrap();
        assert_eq!(second.updated, 1);
        assert_eq!(feed.status_of(3), "active");
    }

    #[tokio::test]
    async fn failing_settlement_does_not_block_the_rest() {
        let now = Utc::now();
        let mut feed = MemoryFeed::with(vec![lobby(1, "ended", now), lobby(2, "ended", now)]);
        feed.broken = Arc::new(HashSet::from([1]));
        let sync = sync(&feed, true, 1);

        let first = sync.sync_once(now).await.unwrap();
        assert_eq!(first.settled, 0);

        let second = sync.sync_once(now).await.unwrap();
        assert_eq!(second.settled, 1);
        assert!(feed.lobbies.lock().unwrap().iter().any(|l| l.id == 2 && l.prizes_distributed));
    }

    #[tokio::test]
    async fn ended_lobby_is_settled_on_the_following_pass() {
        let now = Utc::now();
        let feed = MemoryFeed::with(vec![lobby(1, "active", now)]);
        let sync = sync(&feed, true, 10);

        let summary = sync.sync_once(now).await.unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.settled, 1);
        assert!(feed.lobbies.lock().unwrap()[0].prizes_distributed);
    }
}
