//! Request handlers. Parameters are validated here; the SQL lives in `queries`.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::queries::{self, DailyActivity, MessageHit, ProductMention};
use crate::api::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// `GET /health`
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopProductsQuery {
    /// Default 10, between 1 and 100.
    pub limit: Option<i64>,
}

/// `GET /api/reports/top-products`
pub async fn top_products(
    State(state): State<AppState>,
    params: Result<Query<TopProductsQuery>, QueryRejection>,
) -> Result<Json<Vec<ProductMention>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = bounded("limit", params.limit, 10, 1, 100)?;

    let mentions = state
        .read("retrieve top products", move |conn| queries::top_products(conn, limit))
        .await?;
    Ok(Json(mentions))
}

/// `GET /api/channels/{channel_name}/activity`
pub async fn channel_activity(
    State(state): State<AppState>,
    Path(channel_name): Path<String>,
) -> Result<Json<Vec<DailyActivity>>, ApiError> {
    let name = channel_name.clone();
    let activity = state
        .read("retrieve channel activity", move |conn| queries::channel_activity(conn, &name))
        .await?;

    if activity.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No activity found for channel '{}'. Check channel name or data availability.",
            channel_name
        )));
    }
    Ok(Json(activity))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    /// Default 100, between 1 and 500.
    pub limit: Option<i64>,
}

/// `GET /api/search/messages`
pub async fn search_messages(
    State(state): State<AppState>,
    params: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<MessageHit>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let query = params
        .query
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("query must be a non-empty string".to_string()))?;
    let limit = bounded("limit", params.limit, 100, 1, 500)?;

    let hits = state
        .read("search messages", move |conn| queries::search_messages(conn, &query, limit))
        .await?;
    Ok(Json(hits))
}

fn bounded(name: &str, value: Option<i64>, default: usize, min: i64, max: i64) -> Result<usize, ApiError> {
    match value {
        None => Ok(default),
        Some(v) if (min..=max).contains(&v) => Ok(v as usize),
        Some(v) => Err(ApiError::BadRequest(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, v
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::queries::fixtures;
    use rusqlite::Connection;

    fn seeded_state(dir: &tempfile::TempDir) -> AppState {
        let path = dir.path().join("warehouse.db");
        let conn = Connection::open(&path).unwrap();
        fixtures::seed(&conn).unwrap();
        AppState::new(path)
    }

    #[tokio::test]
    async fn test_top_products_default_limit() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(&dir);

        let Json(mentions) = top_products(State(state), Ok(Query(TopProductsQuery::default())))
            .await
            .unwrap();

        assert_eq!(mentions.len(), 6);
        assert_eq!(mentions[0].product_name, "paracetamol");
    }

    #[tokio::test]
    async fn test_top_products_limit_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(&dir);

        for limit in [0, 101] {
            let params = TopProductsQuery { limit: Some(limit) };
            let err = top_products(State(state.clone()), Ok(Query(params))).await.unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)));
        }
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(&dir);

        let err = channel_activity(State(state), Path("nobody".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(msg) if msg.contains("nobody")));
    }

    #[tokio::test]
    async fn test_channel_activity_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(&dir);

        let Json(activity) = channel_activity(State(state), Path("lobelia4cosmetics".to_string()))
            .await
            .unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].message_count, 3);
    }

    #[tokio::test]
    async fn test_channel_activity_matches_name_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(&dir);

        let Json(activity) = channel_activity(State(state), Path("CheMed".to_string()))
            .await
            .unwrap();
        let days: Vec<&str> = activity.iter().map(|a| a.date.as_str()).collect();
        assert_eq!(days, vec!["2024-05-01", "2024-05-02"]);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(&dir);

        let params = SearchQuery { query: Some(String::new()), limit: None };
        let err = search_messages(State(state.clone()), Ok(Query(params))).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let params = SearchQuery { query: Some("syrup".into()), limit: Some(501) };
        let err = search_messages(State(state), Ok(Query(params))).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_missing_tables_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path).unwrap();

        let params = SearchQuery { query: Some("syrup".into()), limit: None };
        let err = search_messages(State(AppState::new(path)), Ok(Query(params)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(msg) if msg.starts_with("Failed to search messages:")));
    }
}
