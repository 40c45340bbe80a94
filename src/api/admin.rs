use super::{lobbies::lobby_view, lobbies::LobbyView, AppState};
use crate::{
    constants::MAX_LOBBY_CAPACITY,
    error::{AppError, Result},
    models::{ApiResponse, NewLobby},
    services::{settlement::SettlementReport, SettlementService},
    utils::{decimal_to_units, normalize_address, parse_units, serialize_units, units_to_decimal},
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderName},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const ADMIN_KEY_HEADER: &str = "x-admin-key";
const ADMIN_ADDRESS_HEADER: &str = "x-admin-address";

#[derive(Debug, Deserialize)]
pub struct CreateLobbyRequest {
    pub name: String,
    pub entry_fee: String,
    pub start_time: DateTime<Utc>,
    pub interval_seconds: i64,
    pub max_participants: i32,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub user_address: String,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub user_address: String,
    #[serde(serialize_with = "serialize_units")]
    pub credited: u128,
    #[serde(serialize_with = "serialize_units")]
    pub balance: u128,
}

#[derive(Debug, Deserialize)]
pub struct ScoreEntry {
    pub user_address: String,
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct RecordScoresRequest {
    pub scores: Vec<ScoreEntry>,
}

#[derive(Debug, Serialize)]
pub struct RecordScoresResponse {
    pub lobby_id: i64,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct CloseLobbyResponse {
    pub lobby_id: i64,
    pub status: String,
}

fn header_value<'a>(headers: &'a HeaderMap, name: &'static str) -> Option<&'a str> {
    headers
        .get(HeaderName::from_static(name))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Admin calls need the shared key and an allow-listed address. Returns the
/// caller's normalized address.
pub fn require_admin(headers: &HeaderMap, state: &AppState) -> Result<String> {
    let expected = state
        .config
        .admin_manual_key
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AppError::Forbidden("ADMIN_MANUAL_KEY is not configured on backend".to_string())
        })?;

    let provided = header_value(headers, ADMIN_KEY_HEADER).ok_or_else(|| {
        AppError::AuthError(format!(
            "Missing admin key. Send header '{}' to access this endpoint.",
            ADMIN_KEY_HEADER
        ))
    })?;
    if provided != expected {
        return Err(AppError::AuthError("Invalid admin key".to_string()));
    }

    let address = header_value(headers, ADMIN_ADDRESS_HEADER).ok_or_else(|| {
        AppError::AuthError(format!("Missing header '{}'", ADMIN_ADDRESS_HEADER))
    })?;
    let address = normalize_address(address)?;
    if !state.config.is_admin_address(&address) {
        return Err(AppError::Forbidden(format!("{} is not an admin", address)));
    }
    Ok(address)
}

fn validate_new_lobby(req: &CreateLobbyRequest) -> Result<NewLobby> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(AppError::BadRequest(
            "Lobby name must be 1-100 characters".to_string(),
        ));
    }
    if req.interval_seconds <= 0 {
        return Err(AppError::BadRequest("interval_seconds must be > 0".to_string()));
    }
    if req.max_participants < 1 || req.max_participants > MAX_LOBBY_CAPACITY {
        return Err(AppError::BadRequest(format!(
            "max_participants must be between 1 and {}",
            MAX_LOBBY_CAPACITY
        )));
    }
    if chrono::Duration::try_seconds(req.interval_seconds)
        .and_then(|interval| req.start_time.checked_add_signed(interval))
        .is_none()
    {
        return Err(AppError::BadRequest("Lobby end time is out of range".to_string()));
    }

    Ok(NewLobby {
        name: name.to_string(),
        entry_fee: units_to_decimal(parse_units(&req.entry_fee)?)?,
        start_time: req.start_time,
        interval_seconds: req.interval_seconds,
        max_participants: req.max_participants,
    })
}

fn validate_scores(req: &RecordScoresRequest) -> Result<Vec<(String, f64)>> {
    let mut scores = Vec::with_capacity(req.scores.len());
    for entry in &req.scores {
        if !entry.score.is_finite() {
            return Err(AppError::BadRequest(format!(
                "Score for {} must be a finite number",
                entry.user_address
            )));
        }
        scores.push((normalize_address(&entry.user_address)?, entry.score));
    }
    Ok(scores)
}

/// POST /api/v1/admin/lobbies
pub async fn create_lobby(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateLobbyRequest>,
) -> Result<Json<ApiResponse<LobbyView>>> {
    let admin = require_admin(&headers, &state)?;
    let new_lobby = validate_new_lobby(&req)?;

    let lobby = state.db.create_lobby(&new_lobby).await?;
    tracing::info!("Admin {} created lobby {} ({})", admin, lobby.id, lobby.name);

    Ok(Json(ApiResponse::success(lobby_view(
        &lobby,
        state.config.platform_fee_bps,
        Utc::now(),
    )?)))
}

/// POST /api/v1/admin/lobbies/{id}/settle
pub async fn settle_lobby(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SettlementReport>>> {
    let admin = require_admin(&headers, &state)?;
    tracing::info!("Admin {} requested settlement of lobby {}", admin, id);

    let service = SettlementService::new(state.db.clone(), state.config.clone());
    let report = service.settle(id, Utc::now()).await?;

    Ok(Json(ApiResponse::success(report)))
}

/// POST /api/v1/admin/lobbies/{id}/close
pub async fn close_lobby(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CloseLobbyResponse>>> {
    let admin = require_admin(&headers, &state)?;
    state.db.close_lobby(id).await?;
    tracing::warn!("Admin {} closed lobby {}", admin, id);

    Ok(Json(ApiResponse::success(CloseLobbyResponse {
        lobby_id: id,
        status: "closed".to_string(),
    })))
}

/// PUT /api/v1/admin/lobbies/{id}/scores
pub async fn record_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<RecordScoresRequest>,
) -> Result<Json<ApiResponse<RecordScoresResponse>>> {
    require_admin(&headers, &state)?;

    let scores = validate_scores(&req)?;
    let updated = state.db.record_scores(id, &scores).await?;

    Ok(Json(ApiResponse::success(RecordScoresResponse {
        lobby_id: id,
        updated,
    })))
}

/// POST /api/v1/admin/deposits
pub async fn credit_deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DepositRequest>,
) -> Result<Json<ApiResponse<DepositResponse>>> {
    let admin = require_admin(&headers, &state)?;
    let address = normalize_address(&req.user_address)?;
    let amount = parse_units(&req.amount)?;
    if amount == 0 {
        return Err(AppError::BadRequest("Deposit amount must be > 0".to_string()));
    }

    let balance = state
        .db
        .credit_balance(&address, units_to_decimal(amount)?)
        .await?;
    tracing::info!("Admin {} credited {} to {}", admin, amount, address);

    Ok(Json(ApiResponse::success(DepositResponse {
        user_address: address,
        credited: amount,
        balance: decimal_to_units(balance)?,
    })))
}
