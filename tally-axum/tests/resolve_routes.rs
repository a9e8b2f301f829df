use std::sync::{Arc, RwLock};

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, Uri};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tally_axum::{extract_slug, resolve_route, NavigationState, TenantRouter};
use tally_core::adapters::{journal, MemoryDirectory, MemoryProvisioner};
use tally_core::errors::{ErrorKind, TallyError};
use tally_core::registry::{FeatureModule, ServiceRegistry};
use tally_core::service::{Params, TenantService};
use tally_core::store::TenantStore;
use tally_core::tenant::{
    ConnectionConfig, OrgSlug, OrganizationRecord, TenantConnection, TenantContext,
};
use tally_tenant::TenantManager;

struct NotesService {
    store: Arc<dyn TenantStore>,
}

#[async_trait::async_trait]
impl TenantService for NotesService {
    async fn find(&self, _ctx: &TenantContext, _params: &Params) -> Result<Vec<Value>> {
        self.store.find("notes").await
    }

    async fn create(&self, _ctx: &TenantContext, data: Value, _params: &Params) -> Result<Value> {
        self.store.insert("notes", data).await
    }
}

struct NotesModule;

impl FeatureModule for NotesModule {
    fn name(&self) -> &'static str {
        "notes"
    }

    fn build(&self, conn: &TenantConnection) -> Result<Arc<dyn TenantService>> {
        Ok(Arc::new(NotesService {
            store: conn.handle.clone(),
        }))
    }
}

fn slug(s: &str) -> OrgSlug {
    OrgSlug::parse(s).unwrap()
}

fn org(s: &str) -> OrganizationRecord {
    OrganizationRecord::new(
        slug(s),
        s.to_uppercase(),
        ConnectionConfig::new(json!({"backend": "memory"})),
    )
}

async fn build_app(orgs: &[&str]) -> (Arc<TenantManager>, TenantRouter) {
    let directory = Arc::new(MemoryDirectory::new());
    for s in orgs {
        directory.seed(org(s)).await;
    }
    let provisioner = Arc::new(MemoryProvisioner::new(journal()));
    let manager = Arc::new(TenantManager::new(directory, provisioner));

    let registry = Arc::new(RwLock::new(ServiceRegistry::new()));
    manager.bind_registry(registry.clone(), vec![Arc::new(NotesModule)]);

    let router = TenantRouter::new(manager.clone(), registry);
    (manager, router)
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Slug extraction
// ---------------------------------------------------------------------------

#[test]
fn slug_comes_from_the_organizations_path_segment() {
    let uri = Uri::from_static("/organizations/acme/dashboard");
    assert_eq!(extract_slug(&uri), Some(slug("acme")));

    let nested = Uri::from_static("/app/organizations/acme-2/reports/2024");
    assert_eq!(extract_slug(&nested), Some(slug("acme-2")));
}

#[test]
fn slug_falls_back_to_the_query_parameter() {
    let uri = Uri::from_static("/dashboard?theme=dark&slug=acme");
    assert_eq!(extract_slug(&uri), Some(slug("acme")));
}

#[test]
fn no_slug_when_neither_source_matches() {
    for raw in [
        "/",
        "/dashboard",
        "/organizations",
        "/organizations/",
        "/organizations/Not%20A%20Slug",
        "/dashboard?slug=UPPER",
    ] {
        let uri: Uri = raw.parse().unwrap();
        assert_eq!(extract_slug(&uri), None, "expected no slug for {raw}");
    }
}

// ---------------------------------------------------------------------------
// Resolution state machine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolving_a_known_org_ends_connection_active() {
    let (manager, _router) = build_app(&["acme"]).await;

    let uri = Uri::from_static("/organizations/acme/dashboard");
    let resolution = resolve_route(&manager, &uri).await;

    assert_eq!(resolution.state, NavigationState::ConnectionActive);
    assert!(resolution.is_active());
    assert_eq!(manager.current_org().unwrap().slug, slug("acme"));
}

#[tokio::test]
async fn resolving_an_unknown_org_fails_with_not_found() {
    let (manager, _router) = build_app(&["acme"]).await;

    let uri = Uri::from_static("/organizations/ghost");
    let resolution = resolve_route(&manager, &uri).await;

    assert_eq!(resolution.state, NavigationState::Failed);
    let err = resolution.error.expect("error should be surfaced");
    assert_eq!(
        TallyError::from_anyhow(&err).map(|e| e.kind),
        Some(ErrorKind::NotFound)
    );
    assert!(manager.current_org().is_none());
}

#[tokio::test]
async fn resolving_without_a_slug_signals_no_tenant() {
    let (manager, _router) = build_app(&["acme"]).await;

    let uri = Uri::from_static("/dashboard");
    let resolution = resolve_route(&manager, &uri).await;

    assert_eq!(resolution.state, NavigationState::Failed);
    assert!(resolution.error.is_none());
    assert!(resolution.slug.is_none());
}

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tenant_scoped_request_activates_and_dispatches() {
    let (manager, app) = build_app(&["acme"]).await;

    let res = app
        .router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/organizations/acme/notes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    assert!(res.headers().get("x-request-id").is_some());
    assert_eq!(json_body(res).await, json!([]));
    assert_eq!(manager.current_org().unwrap().slug, slug("acme"));
}

#[tokio::test]
async fn unknown_org_is_a_not_found_response() {
    let (_manager, app) = build_app(&["acme"]).await;

    let res = app
        .router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/organizations/ghost/notes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 404);
    let body = json_body(res).await;
    assert_eq!(body["name"], "NotFound");
    assert_eq!(body["className"], "not-found");
}

#[tokio::test]
async fn denied_org_is_masked_as_not_found() {
    let directory = Arc::new(MemoryDirectory::new());
    directory.seed(org("secret")).await;
    directory.deny_reads(&slug("secret")).await;
    let provisioner = Arc::new(MemoryProvisioner::new(journal()));
    let manager = Arc::new(TenantManager::new(directory, provisioner));
    let registry = Arc::new(RwLock::new(ServiceRegistry::new()));
    manager.bind_registry(registry.clone(), vec![Arc::new(NotesModule)]);
    let app = TenantRouter::new(manager, registry);

    let res = app
        .router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/organizations/secret/notes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // 404, not 403: existence is not leaked.
    assert_eq!(res.status().as_u16(), 404);
    let body = json_body(res).await;
    assert_eq!(body["name"], "NotFound");
}

#[tokio::test]
async fn records_stay_isolated_per_tenant_across_switches() {
    let (_manager, app) = build_app(&["acme", "globex"]).await;

    // Create a note while acme is current.
    let res = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/organizations/acme/notes")
                .header("content-type", "application/json")
                .body(Body::from("{\"text\":\"pay the rent\"}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);

    // Navigating to globex switches tenants; its store is empty.
    let res = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/organizations/globex/notes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(res).await, json!([]));

    // Back to acme: fresh connection, same records.
    let res = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/organizations/acme/notes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["text"], "pay the rent");
}

#[tokio::test]
async fn malformed_json_maps_to_bad_request() {
    let (_manager, app) = build_app(&["acme"]).await;

    let res = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/organizations/acme/notes")
                .header("content-type", "application/json")
                .body(Body::from("{\"text\":"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 400);
    let body = json_body(res).await;
    assert_eq!(body["name"], "BadRequest");
    assert!(body.get("errors").is_some());
}

#[tokio::test]
async fn clearing_the_session_releases_the_tenant_and_empties_the_registry() {
    let (manager, app) = build_app(&["acme"]).await;

    let res = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/organizations/acme/notes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);

    let res = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 204);

    assert!(manager.current_org().is_none());
    assert!(app.state.registry.read().unwrap().is_empty());

    let res = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(res).await, json!({"organization": null}));
}
