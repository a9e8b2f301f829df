use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    extract::{OriginalUri, Path, Query, State},
    http::Uri,
    routing, Json, Router,
};
use serde_json::{json, Value};

use tally_core::errors::TallyError;
use tally_core::service::{Params, TenantService};
use tally_core::tenant::TenantContext;

use crate::resolve::resolve_route;
use crate::{TallyAxumError, TenantAppState};

fn map_json_rejection(rejection: JsonRejection) -> TallyAxumError {
    TallyError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [rejection.to_string()]}))
        .into_anyhow()
        .into()
}

/// Resolve the tenant for this request and look up the addressed service.
///
/// Every tenant-scoped request navigates: the manager activates (or keeps)
/// the tenant before anything touches a record, and the registry has been
/// rebuilt for that tenant by the time the lookup runs.
async fn resolve_target(
    state: &TenantAppState,
    uri: &Uri,
    service: &str,
) -> Result<(TenantContext, Arc<dyn TenantService>), TallyAxumError> {
    let resolution = resolve_route(&state.manager, uri).await;
    let (org, _connection) = resolution.into_active()?;

    let svc = state
        .registry
        .read()
        .unwrap()
        .get(service)
        .ok_or_else(|| TallyError::not_found(format!("Unknown service: {service}")))?;

    Ok((TenantContext::new(org.slug), svc))
}

async fn find(
    State(state): State<TenantAppState>,
    Path((_slug, service)): Path<(String, String)>,
    Query(params): Query<Params>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<Vec<Value>>, TallyAxumError> {
    let (ctx, svc) = resolve_target(&state, &uri, &service).await?;
    Ok(Json(svc.find(&ctx, &params).await?))
}

async fn create(
    State(state): State<TenantAppState>,
    Path((_slug, service)): Path<(String, String)>,
    Query(params): Query<Params>,
    OriginalUri(uri): OriginalUri,
    data: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, TallyAxumError> {
    let Json(data) = data.map_err(map_json_rejection)?;
    let (ctx, svc) = resolve_target(&state, &uri, &service).await?;
    Ok(Json(svc.create(&ctx, data, &params).await?))
}

async fn get_one(
    State(state): State<TenantAppState>,
    Path((_slug, service, id)): Path<(String, String, String)>,
    Query(params): Query<Params>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<Value>, TallyAxumError> {
    let (ctx, svc) = resolve_target(&state, &uri, &service).await?;
    Ok(Json(svc.get(&ctx, &id, &params).await?))
}

async fn patch(
    State(state): State<TenantAppState>,
    Path((_slug, service, id)): Path<(String, String, String)>,
    Query(params): Query<Params>,
    OriginalUri(uri): OriginalUri,
    data: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, TallyAxumError> {
    let Json(data) = data.map_err(map_json_rejection)?;
    let (ctx, svc) = resolve_target(&state, &uri, &service).await?;
    Ok(Json(svc.patch(&ctx, &id, data, &params).await?))
}

async fn remove(
    State(state): State<TenantAppState>,
    Path((_slug, service, id)): Path<(String, String, String)>,
    Query(params): Query<Params>,
    OriginalUri(uri): OriginalUri,
) -> Result<Json<Value>, TallyAxumError> {
    let (ctx, svc) = resolve_target(&state, &uri, &service).await?;
    Ok(Json(svc.remove(&ctx, &id, &params).await?))
}

/// Tenant-scoped record routes: `/organizations/{slug}/{service}[/{id}]`.
pub fn tenant_router(state: TenantAppState) -> Router<()> {
    Router::new()
        .route(
            "/organizations/{slug}/{service}",
            routing::get(find).post(create),
        )
        .route(
            "/organizations/{slug}/{service}/{id}",
            routing::get(get_one).patch(patch).delete(remove),
        )
        .with_state(state)
}
