//! Tenant lifecycle events.

use std::future::Future;
use std::pin::Pin;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;

use crate::tenant::{OrganizationRecord, TenantConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

/// The notifications the tenant manager publishes.
#[derive(Clone)]
pub enum TenantEvent {
    /// A tenant became current. Carries the published handle so consumers
    /// receive it explicitly instead of reaching for ambient state.
    Ready {
        org: OrganizationRecord,
        connection: TenantConnection,
    },
    /// The current tenant was released and nothing is active.
    Cleared,
    /// A switch attempt failed.
    Error { message: String },
}

impl TenantEvent {
    pub fn kind(&self) -> TenantEventKind {
        match self {
            TenantEvent::Ready { .. } => TenantEventKind::Ready,
            TenantEvent::Cleared => TenantEventKind::Cleared,
            TenantEvent::Error { .. } => TenantEventKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantEventKind {
    Ready,
    Cleared,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantEventPattern {
    Any,
    Kind(TenantEventKind),
}

impl TenantEventPattern {
    pub fn matches(&self, kind: TenantEventKind) -> bool {
        match self {
            TenantEventPattern::Any => true,
            TenantEventPattern::Kind(k) => *k == kind,
        }
    }
}

pub type EventFut<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Listener signature (async).
pub type EventListener =
    Arc<dyn for<'a> Fn(&'a TenantEvent) -> EventFut<'a> + Send + Sync>;

struct ListenerEntry {
    id: ListenerId,
    pattern: TenantEventPattern,
    listener: EventListener,
    once: bool,
}

/// Minimal runtime-agnostic event hub.
///
/// IMPORTANT DESIGN:
/// - Callers must not need `&mut TenantEventHub` just to emit, because the
///   manager holds this behind a lock.
/// - No lock may be held across `.await`.
///
/// So emission is split into:
/// 1) snapshot (read-only, no await)
/// 2) await listeners (no lock held)
/// 3) cleanup once-listeners (write-lock, no await)
#[derive(Default)]
pub struct TenantEventHub {
    listeners: Vec<ListenerEntry>,
}

impl TenantEventHub {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn on(&mut self, pattern: TenantEventPattern, listener: EventListener) -> ListenerId {
        let id = next_listener_id();
        self.listeners.push(ListenerEntry {
            id,
            pattern,
            listener,
            once: false,
        });
        id
    }

    /// Deliver at most once, then drop the listener.
    pub fn once(&mut self, pattern: TenantEventPattern, listener: EventListener) -> ListenerId {
        let id = next_listener_id();
        self.listeners.push(ListenerEntry {
            id,
            pattern,
            listener,
            once: true,
        });
        id
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|e| e.id != id);
        before != self.listeners.len()
    }

    /// Phase 1: snapshot matching listeners + remember which `once`
    /// listener ids to remove.
    ///
    /// NOTE: no `.await` here, so it is safe under a read-lock.
    pub fn snapshot_emit(&self, event: &TenantEvent) -> (Vec<EventListener>, Vec<ListenerId>) {
        let kind = event.kind();
        let mut to_call = Vec::new();
        let mut once_ids = Vec::new();

        for entry in &self.listeners {
            if entry.pattern.matches(kind) {
                to_call.push(entry.listener.clone());
                if entry.once {
                    once_ids.push(entry.id);
                }
            }
        }

        (to_call, once_ids)
    }

    /// Phase 3: remove `once` listeners after emit finishes.
    ///
    /// NOTE: no `.await`, safe under a write-lock.
    pub fn finalize_once_removals(&mut self, once_ids: &[ListenerId]) {
        if once_ids.is_empty() {
            return;
        }
        self.listeners.retain(|e| !once_ids.contains(&e.id));
    }

    /// Convenience when `&mut self` is directly available (tests,
    /// single-thread use). The manager uses the split phases instead.
    pub async fn emit_async(&mut self, event: &TenantEvent) -> Result<()> {
        let (listeners, once_ids) = self.snapshot_emit(event);

        for f in &listeners {
            f(event).await?;
        }

        self.finalize_once_removals(&once_ids);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn cleared() -> TenantEvent {
        TenantEvent::Cleared
    }

    fn error(msg: &str) -> TenantEvent {
        TenantEvent::Error {
            message: msg.to_string(),
        }
    }

    fn recording_listener(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> EventListener {
        Arc::new(move |event: &TenantEvent| {
            let log = log.clone();
            let kind = event.kind();
            Box::pin(async move {
                log.lock().unwrap().push(format!("{tag}:{kind:?}"));
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn kind_patterns_filter_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = TenantEventHub::new();
        hub.on(
            TenantEventPattern::Kind(TenantEventKind::Cleared),
            recording_listener(log.clone(), "a"),
        );
        hub.on(TenantEventPattern::Any, recording_listener(log.clone(), "b"));

        hub.emit_async(&cleared()).await.unwrap();
        hub.emit_async(&error("boom")).await.unwrap();

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen, vec!["a:Cleared", "b:Cleared", "b:Error"]);
    }

    #[tokio::test]
    async fn once_listeners_fire_a_single_time() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = TenantEventHub::new();
        hub.once(TenantEventPattern::Any, recording_listener(log.clone(), "once"));

        hub.emit_async(&cleared()).await.unwrap();
        hub.emit_async(&cleared()).await.unwrap();

        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn off_removes_a_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = TenantEventHub::new();
        let id = hub.on(TenantEventPattern::Any, recording_listener(log.clone(), "x"));

        assert!(hub.off(id));
        assert!(!hub.off(id));

        hub.emit_async(&cleared()).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn events_report_their_kind() {
        assert_eq!(cleared().kind(), TenantEventKind::Cleared);
        assert_eq!(error("x").kind(), TenantEventKind::Error);
    }
}
