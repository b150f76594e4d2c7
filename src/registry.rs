//! Session registry with per-tenant active pointers
//!
//! The registry owns every live [`AgentSession`], keyed by its current id,
//! and remembers which session each tenant is talking to. Both maps sit
//! behind one mutex so every mutation is applied in a single critical
//! section. Lock order is registry then session.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::session::{AgentSession, EventKind, SessionEvent, SessionInner};
use crate::types::identifiers::{SessionId, TenantId};
use crate::types::options::SessionOptions;
use crate::types::session::SessionInfo;

struct Entry {
    session: AgentSession,
    /// Insertion order, carried across re-keys
    seq: u64,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, Entry>,
    active: HashMap<TenantId, SessionId>,
    next_seq: u64,
}

impl RegistryInner {
    /// Key the session behind `weak` is currently registered under
    fn key_of(&self, weak: &Weak<SessionInner>) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|(_, entry)| entry.session.is(weak))
            .map(|(id, _)| id.clone())
    }

    /// Move an entry from its provisional key to the id the CLI reported
    fn rekey(&mut self, weak: &Weak<SessionInner>, from: &SessionId, to: &SessionId) -> bool {
        if from == to || self.sessions.contains_key(to) {
            return false;
        }
        if !self.sessions.get(from).is_some_and(|e| e.session.is(weak)) {
            return false;
        }
        let Some(entry) = self.sessions.remove(from) else {
            return false;
        };
        self.sessions.insert(to.clone(), entry);
        for id in self.active.values_mut() {
            if id == from {
                *id = to.clone();
            }
        }
        true
    }

    /// Drop the entry for an exited session and every pointer to it
    fn remove(&mut self, weak: &Weak<SessionInner>) -> Option<SessionId> {
        let key = self.key_of(weak)?;
        self.sessions.remove(&key);
        self.active.retain(|_, id| *id != key);
        Some(key)
    }
}

/// Registry of live agent sessions
///
/// Cheap to clone; clones share the same maps. All methods are synchronous
/// and only take short locks, but [`create`](Self::create) and
/// [`resume`](Self::resume) spawn tasks and must run inside a tokio runtime.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    config: Arc<RelayConfig>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            config: Arc::new(config),
        }
    }

    /// Start a session for `tenant_id` and make it the tenant's active one
    ///
    /// # Errors
    /// - `RelayError::Capacity` if the registry is full
    /// - `RelayError::AlreadyActive` if the resume id is already registered
    /// - `RelayError::Process` if the CLI cannot be spawned
    ///
    /// Nothing is registered on failure.
    pub fn create(&self, tenant_id: TenantId, options: SessionOptions) -> Result<AgentSession> {
        let mut inner = self.inner.lock();

        if inner.sessions.len() >= self.config.max_sessions {
            return Err(RelayError::Capacity(self.config.max_sessions));
        }
        if let Some(ref resume) = options.resume
            && inner.sessions.contains_key(resume)
        {
            return Err(RelayError::AlreadyActive(resume.to_string()));
        }

        let session = AgentSession::new(tenant_id, options, &self.config);
        self.attach_listener(&session);
        session.start()?;

        let id = session.provisional_id().clone();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.sessions.insert(
            id.clone(),
            Entry {
                session: session.clone(),
                seq,
            },
        );
        inner.active.insert(tenant_id, id.clone());
        drop(inner);

        log::info!("Registered session {id} for tenant {tenant_id}");
        Ok(session)
    }

    /// Resume an earlier CLI session for `tenant_id`
    ///
    /// The id is known up front, so the session is registered under it and
    /// never re-keyed.
    ///
    /// # Errors
    /// As [`create`](Self::create)
    pub fn resume(
        &self,
        tenant_id: TenantId,
        session_id: impl Into<SessionId>,
        project_path: impl Into<PathBuf>,
    ) -> Result<AgentSession> {
        let options = SessionOptions::builder(project_path)
            .resume(session_id)
            .build();
        self.create(tenant_id, options)
    }

    /// Point `tenant_id` at another registered session
    ///
    /// # Errors
    /// Returns `RelayError::NotFound` if `session_id` is not registered
    pub fn switch(&self, tenant_id: TenantId, session_id: &SessionId) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.sessions.contains_key(session_id) {
            return Err(RelayError::not_found(session_id.as_str()));
        }
        inner.active.insert(tenant_id, session_id.clone());
        log::debug!("Tenant {tenant_id} switched to session {session_id}");
        Ok(())
    }

    /// Stop a registered session
    ///
    /// The entry stays registered until the process exits.
    ///
    /// # Errors
    /// Returns `RelayError::NotFound` if `session_id` is not registered
    pub fn stop(&self, session_id: &SessionId) -> Result<()> {
        let session = self
            .get(session_id)
            .ok_or_else(|| RelayError::not_found(session_id.as_str()))?;
        session.stop();
        Ok(())
    }

    /// Send a user turn to the tenant's active session
    ///
    /// # Errors
    /// - `RelayError::NotFound` if the tenant has no active session
    /// - `RelayError::InactiveSession` if the session cannot accept input
    pub fn send(&self, tenant_id: TenantId, text: &str) -> Result<()> {
        let session = self
            .get_active(tenant_id)
            .ok_or_else(|| RelayError::not_found(format!("no active session for tenant {tenant_id}")))?;
        session.send(text)
    }

    /// Session registered under `session_id`
    ///
    /// Also matches a session whose reported id is known but whose entry
    /// has not been re-keyed yet.
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<AgentSession> {
        let inner = self.inner.lock();
        if let Some(entry) = inner.sessions.get(session_id) {
            return Some(entry.session.clone());
        }
        inner
            .sessions
            .values()
            .find(|e| e.session.reported_id().as_ref() == Some(session_id))
            .map(|e| e.session.clone())
    }

    /// Session the tenant currently points to
    #[must_use]
    pub fn get_active(&self, tenant_id: TenantId) -> Option<AgentSession> {
        let inner = self.inner.lock();
        let id = inner.active.get(&tenant_id)?;
        inner.sessions.get(id).map(|e| e.session.clone())
    }

    /// Snapshot of all registered sessions in insertion order
    #[must_use]
    pub fn list_active(&self) -> Vec<SessionInfo> {
        let inner = self.inner.lock();
        let mut entries: Vec<&Entry> = inner.sessions.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.iter().map(|e| e.session.info()).collect()
    }

    /// Number of registered sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Whether no sessions are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }

    /// Configured capacity
    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.config.max_sessions
    }

    /// Stop every session and forget all of them
    ///
    /// Used at shutdown. Late `exit` events find nothing to remove.
    pub fn stop_all_and_clear(&self) {
        let sessions: Vec<AgentSession> = {
            let mut inner = self.inner.lock();
            inner.active.clear();
            inner.sessions.drain().map(|(_, e)| e.session).collect()
        };
        log::info!("Stopping {} session(s)", sessions.len());
        for session in sessions {
            session.stop();
        }
    }

    /// Keep the maps in step with the session's identity and lifetime
    fn attach_listener(&self, session: &AgentSession) {
        let registry: Weak<Mutex<RegistryInner>> = Arc::downgrade(&self.inner);
        let target = session.downgrade();
        let provisional = session.provisional_id().clone();

        session.on(EventKind::SystemInit, {
            let registry = registry.clone();
            let target = target.clone();
            move |event| {
                let SessionEvent::SystemInit(init) = event else {
                    return;
                };
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                if registry.lock().rekey(&target, &provisional, &init.session_id) {
                    log::info!("Re-keyed session {provisional} -> {}", init.session_id);
                }
            }
        });

        session.on(EventKind::Exit, move |_| {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if let Some(key) = registry.lock().remove(&target) {
                log::info!("Removed exited session {key}");
            }
        });
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("max_sessions", &self.config.max_sessions)
            .finish()
    }
}
