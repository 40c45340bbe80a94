use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::Result,
    models::ApiResponse,
    utils::{decimal_to_units, normalize_address, serialize_units},
};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_address: String,
    #[serde(serialize_with = "serialize_units")]
    pub amount: u128,
    pub updated_at: Option<DateTime<Utc>>,
}

/// GET /api/v1/balance/{address}
pub async fn get_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<BalanceResponse>>> {
    let address = normalize_address(&address)?;

    let response = match state.db.get_balance(&address).await? {
        Some(balance) => BalanceResponse {
            user_address: balance.user_address,
            amount: decimal_to_units(balance.amount)?,
            updated_at: Some(balance.updated_at),
        },
        None => BalanceResponse {
            user_address: address,
            amount: 0,
            updated_at: None,
        },
    };

    Ok(Json(ApiResponse::success(response)))
}
