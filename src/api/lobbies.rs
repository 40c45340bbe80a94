use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    models::{ApiResponse, Lobby, PaginatedResponse},
    services::{
        lobby_status::{can_create_team, is_lobby_active, LobbyStatus, StoredStatus},
        prize_distribution::{distribute, get_prize_for_rank, winners_count},
    },
    utils::{normalize_address, normalize_team_tokens, page_bounds, serialize_units},
};

use super::{AppState, DistributionResponse};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LobbyView {
    pub id: i64,
    pub name: String,
    #[serde(serialize_with = "serialize_units")]
    pub entry_fee: u128,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub interval_seconds: i64,
    pub max_participants: i32,
    pub current_participants: i64,
    pub status: LobbyStatus,
    pub stored_status: StoredStatus,
    pub can_create_team: bool,
    pub is_active: bool,
    #[serde(serialize_with = "serialize_units")]
    pub prize_pool: u128,
    pub winners_count: u64,
    pub prizes_distributed: bool,
}

#[derive(Debug, Serialize)]
pub struct StandingView {
    pub position: u64,
    pub user_address: String,
    pub tokens: Vec<String>,
    pub score: f64,
    pub joined_at: DateTime<Utc>,
    pub final_rank: Option<i64>,
    pub prize_amount: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LobbyDetailResponse {
    pub lobby: LobbyView,
    pub standings: Vec<StandingView>,
}

#[derive(Debug, Deserialize)]
pub struct JoinLobbyRequest {
    pub user_address: String,
    pub tokens: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct JoinLobbyResponse {
    pub lobby_id: i64,
    pub user_address: String,
    pub tokens: Vec<String>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RankPrizeResponse {
    pub lobby_id: i64,
    pub rank: u64,
    #[serde(serialize_with = "serialize_units")]
    pub prize_amount: u128,
}

pub(crate) fn lobby_view(lobby: &Lobby, platform_fee_bps: u32, now: DateTime<Utc>) -> Result<LobbyView> {
    let status = lobby.resolve_status(now);
    let participants = lobby.participant_count();
    Ok(LobbyView {
        id: lobby.id,
        name: lobby.name.clone(),
        entry_fee: lobby.entry_fee_units()?,
        start_time: lobby.start_time,
        end_time: lobby.end_time(),
        interval_seconds: lobby.interval_seconds,
        max_participants: lobby.max_participants,
        current_participants: lobby.current_participants,
        status,
        stored_status: lobby.stored_status(),
        can_create_team: can_create_team(status),
        is_active: is_lobby_active(status),
        prize_pool: lobby.prize_pool(participants, platform_fee_bps)?,
        winners_count: if participants == 0 { 0 } else { winners_count(participants) },
        prizes_distributed: lobby.prizes_distributed,
    })
}

async fn load_lobby(state: &AppState, id: i64) -> Result<Lobby> {
    state
        .db
        .get_lobby(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lobby {} not found", id)))
}

/// GET /api/v1/lobbies
pub async fn list_lobbies(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<LobbyView>>>> {
    let (limit, offset) = page_bounds(query.page, query.limit)?;
    let now = Utc::now();

    let lobbies = state.db.list_lobbies(limit, offset).await?;
    let total = state.db.count_lobbies().await?;

    let items = lobbies
        .iter()
        .map(|lobby| lobby_view(lobby, state.config.platform_fee_bps, now))
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        page: query.page.unwrap_or(1),
        limit,
        total,
    })))
}

/// GET /api/v1/lobbies/{id}
pub async fn get_lobby(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<LobbyDetailResponse>>> {
    let lobby = load_lobby(&state, id).await?;
    let view = lobby_view(&lobby, state.config.platform_fee_bps, Utc::now())?;

    let standings = state
        .db
        .list_participants(id)
        .await?
        .into_iter()
        .enumerate()
        .map(|(idx, p)| StandingView {
            position: idx as u64 + 1,
            user_address: p.user_address,
            tokens: p.tokens,
            score: p.score,
            joined_at: p.joined_at,
            final_rank: p.final_rank,
            prize_amount: p.prize_amount.map(|d| d.to_string()),
        })
        .collect();

    Ok(Json(ApiResponse::success(LobbyDetailResponse {
        lobby: view,
        standings,
    })))
}

/// POST /api/v1/lobbies/{id}/join
pub async fn join_lobby(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<JoinLobbyRequest>,
) -> Result<Json<ApiResponse<JoinLobbyResponse>>> {
    let address = normalize_address(&req.user_address)?;
    let tokens = normalize_team_tokens(&req.tokens)?;

    let participant = state.db.join_lobby(id, &address, &tokens, Utc::now()).await?;

    tracing::info!("User {} joined lobby {} with {:?}", address, id, participant.tokens);

    Ok(Json(ApiResponse::success(JoinLobbyResponse {
        lobby_id: participant.lobby_id,
        user_address: participant.user_address,
        tokens: participant.tokens,
        joined_at: participant.joined_at,
    })))
}

/// GET /api/v1/lobbies/{id}/prizes
pub async fn get_lobby_prizes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DistributionResponse>>> {
    let lobby = load_lobby(&state, id).await?;
    let participants = lobby.participant_count();
    let pool = lobby.prize_pool(participants, state.config.platform_fee_bps)?;

    Ok(Json(ApiResponse::success(DistributionResponse::new(
        participants,
        pool,
        distribute(participants, pool),
    ))))
}

/// GET /api/v1/lobbies/{id}/prizes/{rank}
pub async fn get_lobby_prize_for_rank(
    State(state): State<AppState>,
    Path((id, rank)): Path<(i64, u64)>,
) -> Result<Json<ApiResponse<RankPrizeResponse>>> {
    let lobby = load_lobby(&state, id).await?;
    let participants = lobby.participant_count();
    let pool = lobby.prize_pool(participants, state.config.platform_fee_bps)?;

    Ok(Json(ApiResponse::success(RankPrizeResponse {
        lobby_id: id,
        rank,
        prize_amount: get_prize_for_rank(rank, participants, pool),
    })))
}
