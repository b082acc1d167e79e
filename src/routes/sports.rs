use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
};
use crate::db;
use crate::error::ApiError;
use crate::models::{OutcomeSummary, SportData, SportDetails, SportRecord};
use crate::state::AppState;

// GET /sports/{sport_type} - Full stored record
pub async fn get_sport_data(
    State(state): State<AppState>,
    Path(sport_type): Path<String>,
) -> Result<Json<SportRecord>, ApiError> {
    let record = db::fetch_by_type(&state.pool, &sport_type)
        .await?
        .ok_or(ApiError::NotFound("Sport type not found"))?;

    tracing::debug!(%sport_type, id = ?record.id(), stored_type = ?record.sport_type(), "sport record found");

    Ok(Json(record))
}

// GET /sports/{sport_type}/details - English details only; `zh` is not exposed here
pub async fn get_sport_details(
    State(state): State<AppState>,
    Path(sport_type): Path<String>,
) -> Result<Json<SportDetails>, ApiError> {
    let en = db::fetch_by_type(&state.pool, &sport_type)
        .await?
        .and_then(|record| record.localization("en").cloned())
        .ok_or(ApiError::NotFound("Sport not found"))?;

    let details = SportDetails::from_stored(en)?;

    Ok(Json(details))
}

// POST /sports/{sport_type} - Validate the body and write it with the configured policy
pub async fn update_sport_details(
    State(state): State<AppState>,
    Path(sport_type): Path<String>,
    payload: Result<Json<SportData>, JsonRejection>,
) -> Result<Json<OutcomeSummary>, ApiError> {
    let Json(sport_data) = payload?;
    let document = sport_data.to_document()?;

    let outcome = db::upsert(&state.pool, state.write_policy, &sport_type, document).await?;

    tracing::info!(%sport_type, policy = %state.write_policy, ?outcome, "sport data written");

    Ok(Json(outcome))
}
