use tokio::sync::{mpsc, oneshot, watch};
use shared::types::{RegistrationDescriptor, ServiceRecord};
use crate::error::SessionError;
use crate::provider::DiscoveryProvider;
use crate::session::{Delivery, SessionChannels, SessionManager, SessionNotice, SessionStatus};

/// Commands sent to the session task
pub enum SessionCommand {
    StartBrowsing {
        service_type: String,
        domain: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StopBrowsing(oneshot::Sender<bool>),
    StartRegistering(RegistrationDescriptor, oneshot::Sender<Result<(), SessionError>>),
    StopRegistering(oneshot::Sender<bool>),
    Status(oneshot::Sender<SessionStatus>),
    List(oneshot::Sender<Vec<ServiceRecord>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the task that owns the session manager.
///
/// The task is the single control thread: commands and provider events are
/// applied one at a time, in arrival order.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<Vec<ServiceRecord>>,
}

impl SessionHandle {
    /// Spawn the session task. Notices are delivered on the returned receiver.
    pub fn spawn<P>(provider: P) -> (Self, mpsc::UnboundedReceiver<SessionNotice>)
    where
        P: DiscoveryProvider + 'static,
    {
        let (tx, rx) = mpsc::channel::<SessionCommand>(64);
        let (manager, channels) = SessionManager::new(provider);
        let snapshots = manager.subscribe();
        let SessionChannels { deliveries, notices } = channels;

        tokio::spawn(run(manager, rx, deliveries));

        (Self { tx, snapshots }, notices)
    }

    pub async fn start_browsing(&self, service_type: &str, domain: &str) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::StartBrowsing {
            service_type: service_type.to_string(),
            domain: domain.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Returns false if no browse session was running.
    pub async fn stop_browsing(&self) -> Result<bool, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::StopBrowsing(reply)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn start_registering(&self, descriptor: RegistrationDescriptor) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::StartRegistering(descriptor, reply)).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Returns false if nothing was registered.
    pub async fn stop_registering(&self) -> Result<bool, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::StopRegistering(reply)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Status(reply)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Current registry contents in display order
    pub async fn list(&self) -> Result<Vec<ServiceRecord>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::List(reply)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Stop both sessions and end the task. Returns after the provider has
    /// released them, so the discovery backend can be torn down next.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Shutdown(reply)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Registry snapshots, updated on every change
    pub fn snapshots(&self) -> watch::Receiver<Vec<ServiceRecord>> {
        self.snapshots.clone()
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.tx.send(cmd).await.map_err(|_| SessionError::Closed)
    }
}

async fn run<P: DiscoveryProvider>(
    mut manager: SessionManager<P>,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
) {
    loop {
        tokio::select! {
            cmd = commands.recv() => {
                match cmd {
                    Some(SessionCommand::StartBrowsing { service_type, domain, reply }) => {
                        let result = manager.start_browsing(&service_type, &domain).map(|_| ());
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::StopBrowsing(reply)) => {
                        let _ = reply.send(manager.stop_browsing());
                    }
                    Some(SessionCommand::StartRegistering(descriptor, reply)) => {
                        let result = manager.start_registering(descriptor).map(|_| ());
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::StopRegistering(reply)) => {
                        let _ = reply.send(manager.stop_registering());
                    }
                    Some(SessionCommand::Status(reply)) => {
                        let _ = reply.send(manager.status());
                    }
                    Some(SessionCommand::List(reply)) => {
                        let _ = reply.send(manager.snapshot());
                    }
                    Some(SessionCommand::Shutdown(reply)) => {
                        manager.shutdown();
                        tracing::info!("Session task shutting down");
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        manager.shutdown();
                        tracing::info!("All session handles dropped, shutting down");
                        break;
                    }
                }
            }
            Some(delivery) = deliveries.recv() => {
                manager.deliver(delivery);
            }
        }
    }
}
