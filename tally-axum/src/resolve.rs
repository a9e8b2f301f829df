use axum::http::Uri;
use tracing::debug;

use tally_core::errors::TallyError;
use tally_core::tenant::{OrgSlug, OrganizationRecord, TenantConnection};
use tally_tenant::TenantManager;

/// States a single navigation passes through. `ConnectionActive` and
/// `Failed` are terminal; a failed resolution requires a fresh navigation,
/// there is no implicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Idle,
    SlugExtracted,
    OrgLoaded,
    ConnectionActive,
    Failed,
}

/// Outcome of resolving one navigation.
#[derive(Debug)]
pub struct Resolution {
    pub state: NavigationState,
    pub slug: Option<OrgSlug>,
    pub org: Option<OrganizationRecord>,
    pub connection: Option<TenantConnection>,
    /// The propagated error for a failed resolution. Absent for the
    /// "no tenant in route" condition, where the caller redirects to a
    /// directory surface instead of showing an error.
    pub error: Option<anyhow::Error>,
}

impl Resolution {
    fn no_tenant() -> Self {
        Self {
            state: NavigationState::Failed,
            slug: None,
            org: None,
            connection: None,
            error: None,
        }
    }

    fn failed(slug: OrgSlug, error: anyhow::Error) -> Self {
        Self {
            state: NavigationState::Failed,
            slug: Some(slug),
            org: None,
            connection: None,
            error: Some(error),
        }
    }

    fn active(slug: OrgSlug, org: OrganizationRecord, connection: TenantConnection) -> Self {
        Self {
            state: NavigationState::ConnectionActive,
            slug: Some(slug),
            org: Some(org),
            connection: Some(connection),
            error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == NavigationState::ConnectionActive
    }

    /// Unpack a successful resolution, or surface what went wrong.
    pub fn into_active(self) -> anyhow::Result<(OrganizationRecord, TenantConnection)> {
        match (self.state, self.org, self.connection) {
            (NavigationState::ConnectionActive, Some(org), Some(connection)) => {
                Ok((org, connection))
            }
            (_, _, _) => Err(self.error.unwrap_or_else(|| {
                TallyError::not_found("No organization in route").into_anyhow()
            })),
        }
    }
}

/// Extract a tenant slug from the location.
///
/// The `/organizations/{slug}/...` path segment pattern wins; a `?slug=`
/// query parameter is the fallback. A candidate that fails the slug charset
/// counts as no slug.
pub fn extract_slug(uri: &Uri) -> Option<OrgSlug> {
    let mut segments = uri.path().split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "organizations" {
            if let Some(candidate) = segments.next() {
                if let Ok(slug) = OrgSlug::parse(candidate) {
                    return Some(slug);
                }
            }
            break;
        }
    }

    uri.query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("slug="))
        .and_then(|raw| OrgSlug::parse(raw).ok())
}

/// Drive one navigation: extract the slug, load the organization, activate
/// its connection.
///
/// `Idle → SlugExtracted → OrgLoaded → ConnectionActive` on the success
/// path; any miss lands in `Failed` with the error propagated unchanged
/// from the directory or the pool. This is the first layer allowed to turn
/// those errors into something user-visible.
pub async fn resolve_route(manager: &TenantManager, uri: &Uri) -> Resolution {
    let Some(slug) = extract_slug(uri) else {
        debug!(path = uri.path(), "no tenant slug in location");
        return Resolution::no_tenant();
    };

    let nav = manager.begin_navigation();
    let org = match manager.load_organization(&slug).await {
        Ok(org) => org,
        Err(err) => return Resolution::failed(slug, err),
    };

    match manager.activate_for(nav, org.clone()).await {
        Ok(Some(connection)) => Resolution::active(slug, org, connection),
        Ok(None) => Resolution::failed(
            slug,
            TallyError::transient_io("navigation superseded by a newer one").into_anyhow(),
        ),
        Err(err) => Resolution::failed(slug, err),
    }
}
