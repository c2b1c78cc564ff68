//! Seam between the session manager and an mDNS implementation.

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use shared::types::{RegistrationDescriptor, ServiceRecord};
use crate::error::ProviderError;

/// One item of a browse stream: a resolved presence/loss record, or a failure
/// that terminates the session.
pub type BrowseEvent = Result<ServiceRecord, ProviderError>;

/// One item of a registration stream.
#[derive(Debug)]
pub enum RegistrationEvent {
    Registered(ServiceRecord),
    Failed(String),
}

type Release = Box<dyn FnOnce() + Send>;

/// A live provider operation: its event stream plus what it takes to end it.
pub struct Subscription<T> {
    events: BoxStream<'static, T>,
    teardown: Teardown,
}

impl<T> Subscription<T> {
    pub fn new(events: BoxStream<'static, T>, cancel: CancellationToken) -> Self {
        Self {
            events,
            teardown: Teardown {
                cancel,
                release: None,
            },
        }
    }

    /// Run `release` synchronously when the subscription is torn down.
    pub fn on_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.teardown.release = Some(Box::new(release));
        self
    }

    pub fn into_parts(self) -> (BoxStream<'static, T>, Teardown) {
        (self.events, self.teardown)
    }
}

/// Ends a subscription: cancels its token, then releases provider-side state
/// before returning.
pub struct Teardown {
    cancel: CancellationToken,
    release: Option<Release>,
}

impl Teardown {
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn run(self) {
        self.cancel.cancel();
        if let Some(release) = self.release {
            release();
        }
    }
}

/// Something that can browse for and advertise DNS-SD services.
///
/// Browse streams are expected to be already resolved: records carry host,
/// port and addresses, or are loss notifications.
pub trait DiscoveryProvider: Send {
    fn browse(
        &self,
        service_type: &str,
        domain: &str,
    ) -> Result<Subscription<BrowseEvent>, ProviderError>;

    fn register(
        &self,
        descriptor: &RegistrationDescriptor,
    ) -> Result<Subscription<RegistrationEvent>, ProviderError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};
    use futures::channel::mpsc;
    use futures::StreamExt;
    use super::*;

    /// Sending half of a scripted subscription plus the token handed out with it.
    pub struct Feed<T> {
        pub tx: mpsc::UnboundedSender<T>,
        pub cancel: CancellationToken,
    }

    impl<T> Clone for Feed<T> {
        fn clone(&self) -> Self {
            Self {
                tx: self.tx.clone(),
                cancel: self.cancel.clone(),
            }
        }
    }

    #[derive(Default)]
    struct Script {
        browses: Vec<(String, String, Feed<BrowseEvent>)>,
        registrations: Vec<(RegistrationDescriptor, Feed<RegistrationEvent>)>,
        refuse_next: Option<String>,
        releases: Vec<String>,
    }

    /// In-memory provider whose streams are fed by the test.
    #[derive(Clone, Default)]
    pub struct ScriptedProvider {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedProvider {
        /// Make the next browse or register call fail synchronously.
        pub fn refuse_next(&self, reason: &str) {
            self.script.lock().unwrap().refuse_next = Some(reason.to_string());
        }

        pub fn browse_calls(&self) -> usize {
            self.script.lock().unwrap().browses.len()
        }

        pub fn register_calls(&self) -> usize {
            self.script.lock().unwrap().registrations.len()
        }

        pub fn browse_args(&self, n: usize) -> (String, String) {
            let script = self.script.lock().unwrap();
            let (service_type, domain, _) = &script.browses[n];
            (service_type.clone(), domain.clone())
        }

        pub fn browse_feed(&self, n: usize) -> Feed<BrowseEvent> {
            self.script.lock().unwrap().browses[n].2.clone()
        }

        pub fn register_feed(&self, n: usize) -> Feed<RegistrationEvent> {
            self.script.lock().unwrap().registrations[n].1.clone()
        }

        /// Provider-side releases, in the order they ran
        pub fn releases(&self) -> Vec<String> {
            self.script.lock().unwrap().releases.clone()
        }

        fn record_release(&self, what: String) -> impl FnOnce() + Send + 'static {
            let script = self.script.clone();
            move || script.lock().unwrap().releases.push(what)
        }

        fn take_refusal(&self) -> Option<String> {
            self.script.lock().unwrap().refuse_next.take()
        }
    }

    fn scripted<T: Send + 'static>() -> (Feed<T>, Subscription<T>) {
        let (tx, rx) = mpsc::unbounded();
        let cancel = CancellationToken::new();
        let feed = Feed {
            tx,
            cancel: cancel.clone(),
        };
        (feed, Subscription::new(rx.boxed(), cancel))
    }

    impl DiscoveryProvider for ScriptedProvider {
        fn browse(
            &self,
            service_type: &str,
            domain: &str,
        ) -> Result<Subscription<BrowseEvent>, ProviderError> {
            if let Some(reason) = self.take_refusal() {
                return Err(ProviderError::BrowseFailed {
                    service: service_type.to_string(),
                    reason,
                });
            }
            let (feed, subscription) = scripted();
            self.script.lock().unwrap().browses.push((
                service_type.to_string(),
                domain.to_string(),
                feed,
            ));
            Ok(subscription.on_release(self.record_release(format!("browse {}", service_type))))
        }

        fn register(
            &self,
            descriptor: &RegistrationDescriptor,
        ) -> Result<Subscription<RegistrationEvent>, ProviderError> {
            if let Some(reason) = self.take_refusal() {
                return Err(ProviderError::RegisterFailed {
                    service: descriptor.ty_domain(),
                    reason,
                });
            }
            let (feed, subscription) = scripted();
            self.script
                .lock()
                .unwrap()
                .registrations
                .push((descriptor.clone(), feed));
            Ok(subscription.on_release(self.record_release(format!("register {}", descriptor.name))))
        }
    }
}
