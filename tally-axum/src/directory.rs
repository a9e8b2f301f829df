use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing, Json, Router,
};
use serde_json::{json, Value};

use tally_core::errors::TallyError;
use tally_core::tenant::{OrgSlug, OrganizationRecord};

use crate::{TallyAxumError, TenantAppState};

async fn list_organizations(
    State(state): State<TenantAppState>,
) -> Result<Json<Vec<OrganizationRecord>>, TallyAxumError> {
    let mut records = state.manager.directory().all_organizations().await?;
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(records))
}

async fn create_organization(
    State(state): State<TenantAppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, TallyAxumError> {
    let record: OrganizationRecord = serde_json::from_value(body)
        .map_err(|e| TallyError::bad_request(format!("invalid organization record: {e}")))?;
    // The transparent deserializer accepts any string; enforce the charset
    // before the slug becomes a key.
    let slug = OrgSlug::parse(record.slug.as_str())?;

    state
        .manager
        .directory()
        .upsert_organization(record)
        .await?;
    Ok(Json(json!({"slug": slug})))
}

/// A user's organizations, sorted by display name.
async fn organizations_for_user(
    State(state): State<TenantAppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<OrganizationRecord>>, TallyAxumError> {
    let mut records = state
        .manager
        .directory()
        .organizations_for_user(&user_id)
        .await?;
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(records))
}

async fn grant(
    State(state): State<TenantAppState>,
    Path((user_id, slug)): Path<(String, String)>,
) -> Result<StatusCode, TallyAxumError> {
    let slug = OrgSlug::parse(&slug)?;
    state.manager.directory().grant(&user_id, &slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn revoke(
    State(state): State<TenantAppState>,
    Path((user_id, slug)): Path<(String, String)>,
) -> Result<StatusCode, TallyAxumError> {
    let slug = OrgSlug::parse(&slug)?;
    state.manager.directory().revoke(&user_id, &slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current_session(State(state): State<TenantAppState>) -> Json<Value> {
    Json(json!({"organization": state.manager.current_org()}))
}

/// Logout / explicit disconnect: release the tenant connection.
async fn clear_session(State(state): State<TenantAppState>) -> StatusCode {
    state.manager.clear().await;
    StatusCode::NO_CONTENT
}

/// Directory, membership and session surfaces.
pub fn directory_router(state: TenantAppState) -> Router<()> {
    Router::new()
        .route(
            "/organizations",
            routing::get(list_organizations).post(create_organization),
        )
        .route("/users/{id}/organizations", routing::get(organizations_for_user))
        .route(
            "/users/{id}/organizations/{slug}",
            routing::put(grant).delete(revoke),
        )
        .route(
            "/session",
            routing::get(current_session).delete(clear_session),
        )
        .with_state(state)
}
