use std::sync::{Arc, RwLock};

use axum::routing::MethodRouter;
use axum::Router;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use tally_core::registry::ServiceRegistry;
use tally_tenant::TenantManager;

use crate::{directory, rest, TenantAppState};

/// The assembled HTTP surface: tenant-scoped dispatch, directory routes,
/// request-id and trace middleware.
pub struct TenantRouter {
    pub state: TenantAppState,
    pub router: Router<()>,
}

impl Clone for TenantRouter {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            router: self.router.clone(),
        }
    }
}

impl TenantRouter {
    pub fn new(manager: Arc<TenantManager>, registry: Arc<RwLock<ServiceRegistry>>) -> Self {
        let state = TenantAppState::new(manager, registry);

        let router = Router::new()
            .merge(rest::tenant_router(state.clone()))
            .merge(directory::directory_router(state.clone()))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            );

        Self { state, router }
    }

    /// Mount an extra route (health checks and the like).
    pub fn route(mut self, path: &str, method_router: MethodRouter<()>) -> Self {
        self.router = self.router.route(path, method_router);
        self
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
