use std::fmt;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use shared::protocol::ty_domain;
use shared::types::{RegistrationDescriptor, ServiceRecord};
use crate::error::{ProviderError, SessionError};
use crate::provider::{BrowseEvent, DiscoveryProvider, RegistrationEvent, Teardown};
use super::registry::ServiceRegistry;

/// Identifies one browse or registration session. Never reused.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Browse,
    Register,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Browse => f.write_str("browse"),
            SessionKind::Register => f.write_str("register"),
        }
    }
}

/// A provider event tagged with the session it belongs to.
#[derive(Debug)]
pub enum Delivery {
    Service(SessionId, BrowseEvent),
    Registration(SessionId, RegistrationEvent),
    /// The provider stream finished on its own
    Ended(SessionKind, SessionId),
}

/// Asynchronous outcomes reported to whoever drives the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    BrowseFailed(String),
    /// First confirmation of the current registration
    Registered(ServiceRecord),
    RegistrationFailed(String),
    Ended(SessionKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub browsing: bool,
    pub registering: bool,
    pub registered: bool,
    pub services: usize,
}

/// Receiving ends owned by the task that drives a [`SessionManager`].
pub struct SessionChannels {
    pub deliveries: mpsc::UnboundedReceiver<Delivery>,
    pub notices: mpsc::UnboundedReceiver<SessionNotice>,
}

struct ActiveSession {
    id: SessionId,
    teardown: Teardown,
}

impl ActiveSession {
    /// Returns once the provider has let go of the session.
    fn release(self) {
        self.teardown.run();
    }
}

struct ActiveRegistration {
    session: ActiveSession,
    descriptor: RegistrationDescriptor,
    confirmed: bool,
}

/// Owns at most one browse session and one registration session and keeps
/// the service registry in step with the browse session.
///
/// Not synchronized: every call, including [`deliver`](Self::deliver), must
/// come from the same task.
pub struct SessionManager<P> {
    provider: P,
    next_id: SessionId,
    browse: Option<ActiveSession>,
    registration: Option<ActiveRegistration>,
    registry: ServiceRegistry,
    deliveries: mpsc::UnboundedSender<Delivery>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    snapshots: watch::Sender<Vec<ServiceRecord>>,
}

impl<P: DiscoveryProvider> SessionManager<P> {
    pub fn new(provider: P) -> (Self, SessionChannels) {
        let (deliveries_tx, deliveries) = mpsc::unbounded_channel();
        let (notices_tx, notices) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(Vec::new());

        let manager = Self {
            provider,
            next_id: 1,
            browse: None,
            registration: None,
            registry: ServiceRegistry::new(),
            deliveries: deliveries_tx,
            notices: notices_tx,
            snapshots,
        };
        (manager, SessionChannels { deliveries, notices })
    }

    /// Start browsing for `service_type` in `domain`.
    /// Fails with [`SessionError::AlreadyActive`] if a browse session is live.
    pub fn start_browsing(&mut self, service_type: &str, domain: &str) -> Result<SessionId, SessionError> {
        if let Some(active) = &self.browse {
            tracing::debug!("Browse session {} already active", active.id);
            return Err(SessionError::AlreadyActive(SessionKind::Browse));
        }

        let (events, teardown) = self.provider.browse(service_type, domain)?.into_parts();
        let id = self.allocate_id();
        spawn_pump(
            SessionKind::Browse,
            id,
            events,
            teardown.token(),
            self.deliveries.clone(),
            Delivery::Service,
        );
        self.browse = Some(ActiveSession { id, teardown });

        tracing::info!("Started browsing {} (session {})", ty_domain(service_type, domain), id);
        Ok(id)
    }

    /// Stop browsing and clear the registry. Returns false if nothing was running.
    pub fn stop_browsing(&mut self) -> bool {
        let stopped = match self.browse.take() {
            Some(active) => {
                tracing::info!("Stopping browse session {}", active.id);
                active.release();
                true
            }
            None => {
                tracing::debug!("Browse already stopped");
                false
            }
        };

        if !self.registry.is_empty() {
            self.registry.clear();
            self.publish();
        }
        stopped
    }

    /// Advertise `descriptor`. Confirmation or failure arrives as a [`SessionNotice`].
    pub fn start_registering(&mut self, descriptor: RegistrationDescriptor) -> Result<SessionId, SessionError> {
        if let Some(active) = &self.registration {
            tracing::debug!("Registration session {} already active", active.session.id);
            return Err(SessionError::AlreadyActive(SessionKind::Register));
        }

        let (events, teardown) = self.provider.register(&descriptor)?.into_parts();
        let id = self.allocate_id();
        spawn_pump(
            SessionKind::Register,
            id,
            events,
            teardown.token(),
            self.deliveries.clone(),
            Delivery::Registration,
        );

        tracing::info!("Registering {} (session {})", descriptor.identity(), id);
        self.registration = Some(ActiveRegistration {
            session: ActiveSession { id, teardown },
            descriptor,
            confirmed: false,
        });
        Ok(id)
    }

    /// Withdraw the advertisement. Returns false if nothing was registered.
    pub fn stop_registering(&mut self) -> bool {
        match &self.registration {
            Some(active) => tracing::info!("Unregistering {}", active.descriptor.identity()),
            None => tracing::debug!("Registration already stopped"),
        }
        self.release_registration()
    }

    /// Stop both sessions. The provider has released them when this returns.
    pub fn shutdown(&mut self) {
        self.stop_browsing();
        self.stop_registering();
    }

    /// Apply one event handed back by a pump task.
    pub fn deliver(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Service(session, Ok(record)) => self.on_service_event(session, record),
            Delivery::Service(session, Err(e)) => self.on_browse_failure(session, e),
            Delivery::Registration(session, event) => self.on_registration_event(session, event),
            Delivery::Ended(kind, session) => self.on_session_ended(kind, session),
        }
    }

    /// Merge a presence or loss record into the registry if `session` is the
    /// live browse session.
    pub fn on_service_event(&mut self, session: SessionId, record: ServiceRecord) {
        if !self.is_current_browse(session) {
            tracing::debug!("Ignoring event for stale browse session {}: {}", session, record.identity);
            return;
        }

        if record.lost {
            tracing::debug!("Service lost: {}", record.identity);
            if self.registry.remove_by_identity(&record.identity) {
                self.publish();
            }
        } else {
            tracing::debug!("Service resolved: {}", record.identity);
            self.registry.upsert(record);
            self.publish();
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            browsing: self.browse.is_some(),
            registering: self.registration.is_some(),
            registered: self.registration.as_ref().map_or(false, |r| r.confirmed),
            services: self.registry.len(),
        }
    }

    pub fn snapshot(&self) -> Vec<ServiceRecord> {
        self.registry.snapshot()
    }

    /// Registry snapshots, re-sent on every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ServiceRecord>> {
        self.snapshots.subscribe()
    }

    #[cfg(test)]
    pub fn browse_session(&self) -> Option<SessionId> {
        self.browse.as_ref().map(|active| active.id)
    }

    fn on_browse_failure(&mut self, session: SessionId, error: ProviderError) {
        if !self.is_current_browse(session) {
            tracing::debug!("Ignoring failure of stale browse session {}: {}", session, error);
            return;
        }

        tracing::error!("Browse session {} failed: {}", session, error);
        if let Some(active) = self.browse.take() {
            active.release();
        }
        self.notify(SessionNotice::BrowseFailed(error.to_string()));
    }

    fn on_registration_event(&mut self, session: SessionId, event: RegistrationEvent) {
        let Some(active) = self.registration.as_mut().filter(|r| r.session.id == session) else {
            tracing::debug!("Ignoring event for stale registration session {}", session);
            return;
        };

        match event {
            RegistrationEvent::Registered(record) => {
                if active.confirmed {
                    tracing::debug!("Already confirmed: {}", record.identity);
                    return;
                }
                active.confirmed = true;
                tracing::info!("Registered {}", record.identity);
                self.notify(SessionNotice::Registered(record));
            }
            RegistrationEvent::Failed(reason) => {
                tracing::error!("Registration of {} failed: {}", active.descriptor.identity(), reason);
                self.release_registration();
                self.notify(SessionNotice::RegistrationFailed(reason));
            }
        }
    }

    fn on_session_ended(&mut self, kind: SessionKind, session: SessionId) {
        match kind {
            SessionKind::Browse => {
                if !self.is_current_browse(session) {
                    return;
                }
                tracing::warn!("Browse session {} ended by provider", session);
                if let Some(active) = self.browse.take() {
                    active.release();
                }
                self.notify(SessionNotice::Ended(SessionKind::Browse));
            }
            SessionKind::Register => {
                let confirmed = match &self.registration {
                    Some(active) if active.session.id == session => active.confirmed,
                    _ => return,
                };
                tracing::warn!("Registration session {} ended by provider", session);
                self.release_registration();
                if confirmed {
                    self.notify(SessionNotice::Ended(SessionKind::Register));
                } else {
                    self.notify(SessionNotice::RegistrationFailed(
                        "registration ended before it was confirmed".to_string(),
                    ));
                }
            }
        }
    }

    fn is_current_browse(&self, session: SessionId) -> bool {
        self.browse.as_ref().map_or(false, |active| active.id == session)
    }

    fn release_registration(&mut self) -> bool {
        match self.registration.take() {
            Some(active) => {
                active.session.release();
                true
            }
            None => false,
        }
    }

    fn allocate_id(&mut self) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.registry.snapshot());
    }

    fn notify(&self, notice: SessionNotice) {
        if self.notices.send(notice).is_err() {
            tracing::debug!("Session notice dropped, no listener");
        }
    }
}

/// Forward a provider stream into the delivery channel until the session is
/// cancelled or the stream ends.
fn spawn_pump<T, F>(
    kind: SessionKind,
    session: SessionId,
    mut events: BoxStream<'static, T>,
    cancel: CancellationToken,
    deliveries: mpsc::UnboundedSender<Delivery>,
    wrap: F,
) where
    T: Send + 'static,
    F: Fn(SessionId, T) -> Delivery + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                item = events.next() => match item {
                    Some(item) => {
                        if deliveries.send(wrap(session, item)).is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = deliveries.send(Delivery::Ended(kind, session));
                        break;
                    }
                },
            }
        }
        tracing::debug!("{} pump for session {} finished", kind, session);
    });
}
