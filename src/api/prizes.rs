use axum::{extract::Query, Json};
use serde::Deserialize;

use crate::{
    constants::MAX_PREVIEW_PARTICIPANTS,
    error::{AppError, Result},
    models::ApiResponse,
    services::prize_distribution::distribute,
    utils::parse_units,
};

use super::DistributionResponse;

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub participants: u64,
    pub pool: String,
}

/// GET /api/v1/prizes/preview?participants=&pool=
pub async fn preview(
    Query(query): Query<PreviewQuery>,
) -> Result<Json<ApiResponse<DistributionResponse>>> {
    if query.participants > MAX_PREVIEW_PARTICIPANTS {
        return Err(AppError::BadRequest(format!(
            "participants must be at most {}",
            MAX_PREVIEW_PARTICIPANTS
        )));
    }
    let pool = parse_units(&query.pool)?;

    Ok(Json(ApiResponse::success(DistributionResponse::new(
        query.participants,
        pool,
        distribute(query.participants, pool),
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preview_returns_distribution() {
        let Json(response) = preview(Query(PreviewQuery {
            participants: 10,
            pool: "1000".to_string(),
        }))
        .await
        .unwrap();

        assert!(response.success);
        assert_eq!(response.data.winners_count, 5);
        let amounts: Vec<u128> = response.data.entries.iter().map(|e| e.prize_amount).collect();
        assert_eq!(amounts, vec![450, 250, 150, 75, 75]);
    }

    #[tokio::test]
    async fn preview_rejects_malformed_pool() {
        let result = preview(Query(PreviewQuery {
            participants: 10,
            pool: "12.5".to_string(),
        }))
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn preview_caps_participants() {
        let result = preview(Query(PreviewQuery {
            participants: MAX_PREVIEW_PARTICIPANTS + 1,
            pool: "1000".to_string(),
        }))
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
