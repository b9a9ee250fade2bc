use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateTransactionRequest, DeleteResponse, ListQuery, Summary, UpdateTransactionRequest},
    repo_types::Transaction,
    services,
};
use crate::{auth::extractors::AuthUser, error::AppResult, state::AppState};

pub fn transaction_routes() -> Router<AppState> {
    Router::new()
        .route("/transaction", get(list_transactions).post(create_transaction))
        .route("/transaction/summary", get(transaction_summary))
        .route(
            "/transaction/:id",
            get(get_transaction)
                .patch(update_transaction)
                .delete(delete_transaction),
        )
}

#[instrument(skip(state, payload), fields(user_id = %user.id))]
pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> AppResult<(StatusCode, HeaderMap, Json<Transaction>)> {
    let Json(payload) = payload?;
    let created = services::create(state.transactions.as_ref(), user.id, payload).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/transaction/{}", created.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(created)))
}

#[instrument(skip(state, query), fields(user_id = %user.id))]
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Transaction>>> {
    let Query(query) = query?;
    let rows =
        services::list_for_owner(state.transactions.as_ref(), user.id, query.into()).await?;
    Ok(Json(rows))
}

#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn transaction_summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Summary>> {
    let summary = services::summary(state.transactions.as_ref(), user.id).await?;
    Ok(Json(summary))
}

#[instrument(skip(state, id), fields(user_id = %user.id))]
pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Transaction>> {
    let Path(id) = id?;
    let row = services::get_for_owner(state.transactions.as_ref(), id, user.id).await?;
    Ok(Json(row))
}

#[instrument(skip(state, id, payload), fields(user_id = %user.id))]
pub async fn update_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateTransactionRequest>, JsonRejection>,
) -> AppResult<Json<Transaction>> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let row = services::update(state.transactions.as_ref(), id, payload, user.id).await?;
    Ok(Json(row))
}

#[instrument(skip(state, id), fields(user_id = %user.id))]
pub async fn delete_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<DeleteResponse>> {
    let Path(id) = id?;
    let resp = services::remove(state.transactions.as_ref(), id, user.id).await?;
    Ok(Json(resp))
}
