use std::sync::Arc;

use serde_json::json;

use tally_core::adapters::{journal, Journal, MemoryDirectory, MemoryProvisioner};
use tally_core::errors::{ErrorKind, TallyError};
use tally_core::events::{EventListener, TenantEvent, TenantEventKind, TenantEventPattern};
use tally_core::tenant::{ConnectionConfig, OrgSlug, OrganizationRecord};
use tally_tenant::TenantManager;

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

struct Harness {
    directory: Arc<MemoryDirectory>,
    provisioner: Arc<MemoryProvisioner>,
    manager: TenantManager,
    journal: Journal,
}

async fn harness(orgs: &[&str]) -> Harness {
    let journal = journal();
    let directory = Arc::new(MemoryDirectory::new());
    for s in orgs {
        directory.seed(org(s)).await;
    }
    let provisioner = Arc::new(MemoryProvisioner::new(journal.clone()));
    let manager = TenantManager::new(directory.clone(), provisioner.clone());
    Harness {
        directory,
        provisioner,
        manager,
        journal,
    }
}

/// Records "ready:{slug}" / "cleared" / "error" into the shared journal.
fn journal_listener(journal: Journal) -> EventListener {
    Arc::new(move |event: &TenantEvent| {
        let journal = journal.clone();
        let entry = match event {
            TenantEvent::Ready { org, .. } => format!("ready:{}", org.slug),
            TenantEvent::Cleared => "cleared".to_string(),
            TenantEvent::Error { .. } => "error".to_string(),
        };
        Box::pin(async move {
            journal.lock().unwrap().push(entry);
            Ok(())
        })
    })
}

#[tokio::test]
async fn load_of_unknown_slug_fails_with_not_found() {
    let h = harness(&["acme"]).await;

    let err = h.manager.load_organization(&slug("ghost")).await.unwrap_err();
    assert_eq!(
        TallyError::from_anyhow(&err).map(|e| e.kind),
        Some(ErrorKind::NotFound)
    );
}

#[tokio::test]
async fn access_errors_propagate_unchanged_from_load() {
    let h = harness(&["secret"]).await;
    h.directory.deny_reads(&slug("secret")).await;

    let err = h.manager.load_organization(&slug("secret")).await.unwrap_err();
    assert_eq!(
        TallyError::from_anyhow(&err).map(|e| e.kind),
        Some(ErrorKind::Access)
    );
}

#[tokio::test]
async fn repeated_activation_reuses_the_connection_and_reemits_ready() {
    let h = harness(&["acme"]).await;
    h.manager
        .on(TenantEventPattern::Kind(TenantEventKind::Ready), journal_listener(h.journal.clone()));

    let first = h.manager.activate(org("acme")).await.unwrap();
    let second = h.manager.activate(org("acme")).await.unwrap();

    // Same live handle, one provisioning round trip.
    assert!(first.same_handle(&second));
    assert_eq!(h.provisioner.provision_count(), 1);

    // The signal is idempotent, not the notification: Ready fired twice.
    let log = h.journal.lock().unwrap().clone();
    assert_eq!(
        log,
        vec!["provision:acme", "ready:acme", "ready:acme"]
    );
}

#[tokio::test]
async fn switching_releases_the_outgoing_tenant_before_ready_fires() {
    let h = harness(&["acme", "globex"]).await;
    h.manager
        .on(TenantEventPattern::Any, journal_listener(h.journal.clone()));

    h.manager.activate(org("acme")).await.unwrap();
    h.manager.activate(org("globex")).await.unwrap();

    let log = h.journal.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            "provision:acme",
            "ready:acme",
            "close:acme",
            "provision:globex",
            "ready:globex"
        ]
    );

    // Never two live connections.
    assert_eq!(h.manager.pool().live_count().await, 1);
    assert!(h.manager.pool().is_live(&slug("globex")).await);
    assert_eq!(h.manager.current_org().unwrap().slug, slug("globex"));
}

#[tokio::test]
async fn concurrent_activations_serialize_and_the_last_wins() {
    let h = harness(&["acme", "globex"]).await;

    let (a, b) = tokio::join!(
        h.manager.activate(org("acme")),
        h.manager.activate(org("globex"))
    );
    a.unwrap();
    b.unwrap();

    // Exactly one connection is live at the end: the later caller's. The
    // first caller's connection was created, then released by the switch.
    assert_eq!(h.manager.pool().live_count().await, 1);
    assert!(h.manager.pool().is_live(&slug("globex")).await);
    assert_eq!(h.manager.current_org().unwrap().slug, slug("globex"));

    let log = h.journal.lock().unwrap().clone();
    assert!(log.contains(&"close:acme".to_string()));
}

#[tokio::test]
async fn clear_without_an_active_org_is_a_silent_noop() {
    let h = harness(&[]).await;
    h.manager
        .on(TenantEventPattern::Any, journal_listener(h.journal.clone()));

    h.manager.clear().await;

    assert!(h.manager.current_org().is_none());
    assert!(h.journal.lock().unwrap().is_empty());
}

#[tokio::test]
async fn clear_releases_the_connection_and_publishes_cleared() {
    let h = harness(&["acme"]).await;
    h.manager
        .on(TenantEventPattern::Any, journal_listener(h.journal.clone()));

    h.manager.activate(org("acme")).await.unwrap();
    h.manager.clear().await;

    assert!(h.manager.current_org().is_none());
    assert!(h.manager.current_connection().is_none());
    assert_eq!(h.manager.pool().live_count().await, 0);

    let log = h.journal.lock().unwrap().clone();
    assert_eq!(
        log,
        vec!["provision:acme", "ready:acme", "close:acme", "cleared"]
    );

    // Clearing again stays a no-op.
    h.manager.clear().await;
    assert_eq!(h.journal.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn superseded_navigation_is_dropped_without_touching_state() {
    let h = harness(&["acme", "globex"]).await;

    // A navigation towards acme starts, and its directory response is slow.
    let nav = h.manager.begin_navigation();
    let stale_org = h.manager.load_organization(&slug("acme")).await.unwrap();

    // Meanwhile the user clicks through to globex.
    h.manager.activate(org("globex")).await.unwrap();

    // The late activate for acme is ignored, not applied.
    let outcome = h.manager.activate_for(nav, stale_org).await.unwrap();
    assert!(outcome.is_none());
    assert_eq!(h.manager.current_org().unwrap().slug, slug("globex"));
    assert!(!h.manager.pool().is_live(&slug("acme")).await);
    assert_eq!(h.provisioner.provision_count(), 1);
}

#[tokio::test]
async fn activation_with_unusable_config_fails_with_config_error() {
    let h = harness(&[]).await;
    h.manager
        .on(TenantEventPattern::Any, journal_listener(h.journal.clone()));

    let broken = OrganizationRecord::new(slug("broken"), "Broken", ConnectionConfig::default());
    let err = h.manager.activate(broken).await.unwrap_err();

    assert_eq!(
        TallyError::from_anyhow(&err).map(|e| e.kind),
        Some(ErrorKind::Config)
    );
    assert!(h.manager.current_org().is_none());
    assert_eq!(h.journal.lock().unwrap().clone(), vec!["error"]);
}

#[tokio::test]
async fn provisioning_failure_publishes_error_and_propagates() {
    let h = harness(&["acme"]).await;
    h.provisioner.fail_for(&slug("acme"));
    h.manager
        .on(TenantEventPattern::Kind(TenantEventKind::Error), journal_listener(h.journal.clone()));

    let err = h.manager.activate(org("acme")).await.unwrap_err();
    assert_eq!(
        TallyError::from_anyhow(&err).map(|e| e.kind),
        Some(ErrorKind::TransientIo)
    );
    assert!(h.manager.current_org().is_none());
    assert_eq!(h.journal.lock().unwrap().clone(), vec!["error"]);
}

#[tokio::test]
async fn teardown_failure_during_switch_is_swallowed() {
    let h = harness(&["acme", "globex"]).await;
    h.provisioner.fail_close_for(&slug("acme"));

    h.manager.activate(org("acme")).await.unwrap();
    // The switch succeeds even though acme's teardown reports a failure.
    h.manager.activate(org("globex")).await.unwrap();

    assert_eq!(h.manager.current_org().unwrap().slug, slug("globex"));
    assert_eq!(h.manager.pool().live_count().await, 1);
}

#[tokio::test]
async fn ready_event_carries_the_published_connection() {
    let h = harness(&["acme"]).await;

    let seen = journal();
    let seen_clone = seen.clone();
    h.manager.once(
        TenantEventPattern::Kind(TenantEventKind::Ready),
        Arc::new(move |event: &TenantEvent| {
            let seen = seen_clone.clone();
            let entry = match event {
                TenantEvent::Ready { connection, .. } => format!("conn:{}", connection.slug),
                _ => "other".to_string(),
            };
            Box::pin(async move {
                seen.lock().unwrap().push(entry);
                Ok(())
            })
        }),
    );

    let conn = h.manager.activate(org("acme")).await.unwrap();
    assert_eq!(conn.slug, slug("acme"));
    assert_eq!(seen.lock().unwrap().clone(), vec!["conn:acme"]);

    // `once` listener is gone: a second activation records nothing new.
    h.manager.activate(org("acme")).await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}
