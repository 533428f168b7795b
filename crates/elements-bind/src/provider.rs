//! # Scope Provider
//!
//! Root propagation node. Publishes a client handle to all descendants,
//! either already resolved ("sync" scope) or through a one-shot readiness
//! signal ("async" scope). Descendants receive a [`Scope`] value through
//! their constructors instead of an implicit tree context.

use crate::client::ClientFactory;
use crate::lock;
use crate::registry::WidgetRegistry;
use elements_core::{ElementsError, ElementsResult, WidgetClient};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Poll interval while waiting for an asynchronously loaded SDK script
const ASYNC_CHECK_INTERVAL: Duration = Duration::from_millis(250);

type ReadyCallback = Box<dyn FnOnce(WidgetClient) + Send>;

enum ReadyState {
    Pending(Vec<ReadyCallback>),
    Resolved(WidgetClient),
}

/// One-shot readiness signal with a cached resolved value.
///
/// Subscribers attaching after resolution are invoked synchronously; earlier
/// subscribers are queued and invoked exactly once, in registration order,
/// when [`ReadySignal::resolve`] first runs. Notifications are never lost.
#[derive(Clone)]
pub struct ReadySignal {
    inner: Arc<Mutex<ReadyState>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ReadyState::Pending(Vec::new()))),
        }
    }

    /// Subscribe for the client handle; fires exactly once per subscriber
    pub fn on_ready(&self, callback: impl FnOnce(WidgetClient) + Send + 'static) {
        let mut state = lock(&self.inner);
        match &mut *state {
            ReadyState::Resolved(client) => {
                let client = client.clone();
                drop(state);
                callback(client);
            }
            ReadyState::Pending(queue) => queue.push(Box::new(callback)),
        }
    }

    /// Resolve the signal, draining queued subscribers in registration
    /// order. Only the first resolution takes effect.
    pub fn resolve(&self, client: WidgetClient) {
        let queued = {
            let mut state = lock(&self.inner);
            match std::mem::replace(&mut *state, ReadyState::Resolved(client.clone())) {
                ReadyState::Pending(queue) => queue,
                ReadyState::Resolved(first) => {
                    debug!("ready signal already resolved; keeping the first client");
                    *state = ReadyState::Resolved(first);
                    return;
                }
            }
        };
        for callback in queued {
            callback(client.clone());
        }
    }

    /// The resolved client, if any
    pub fn get(&self) -> Option<WidgetClient> {
        match &*lock(&self.inner) {
            ReadyState::Resolved(client) => Some(client.clone()),
            ReadyState::Pending(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*lock(&self.inner), ReadyState::Resolved(_))
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Two-variant context value distributed to descendants
#[derive(Clone)]
pub enum ClientScope {
    /// Handle was available at construction time
    Sync(WidgetClient),
    /// Handle arrives later through the signal
    Async(ReadySignal),
}

impl ClientScope {
    /// Deliver the client exactly once: synchronously if available, queued
    /// otherwise
    pub fn on_ready(&self, callback: impl FnOnce(WidgetClient) + Send + 'static) {
        match self {
            ClientScope::Sync(client) => callback(client.clone()),
            ClientScope::Async(signal) => signal.on_ready(callback),
        }
    }

    /// The client handle, if currently available
    pub fn current(&self) -> Option<WidgetClient> {
        match self {
            ClientScope::Sync(client) => Some(client.clone()),
            ClientScope::Async(signal) => signal.get(),
        }
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, ClientScope::Sync(_))
    }
}

/// Dependency-injection context handed down through constructors.
///
/// Carries the client scope and, inside a registry subtree, the registry
/// itself. Components that need a registry fail with a scope error at
/// construction when handed a scope without one.
#[derive(Clone)]
pub struct Scope {
    pub(crate) client: ClientScope,
    pub(crate) registry: Option<WidgetRegistry>,
}

impl Scope {
    pub fn client(&self) -> &ClientScope {
        &self.client
    }

    pub fn registry(&self) -> Option<&WidgetRegistry> {
        self.registry.as_ref()
    }
}

/// How a provider obtains its pre-built client handle
pub enum ClientSlot {
    /// Already constructed
    Ready(WidgetClient),
    /// Will be supplied later through [`ScopeProvider::provide_client`]
    Pending,
}

/// Provider construction options: exactly one of `api_key` / `client`
#[derive(Default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    /// Options bag forwarded to client construction (part of the cache key)
    pub client_options: Value,
    pub client: Option<ClientSlot>,
    /// With credentials: wait for the SDK script to load instead of failing
    /// when it is not present yet
    pub async_sdk: bool,
}

impl ProviderConfig {
    pub fn api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn client(client: WidgetClient) -> Self {
        Self {
            client: Some(ClientSlot::Ready(client)),
            ..Self::default()
        }
    }

    pub fn pending_client() -> Self {
        Self {
            client: Some(ClientSlot::Pending),
            ..Self::default()
        }
    }

    /// Builder: set the client construction options
    pub fn with_client_options(mut self, options: Value) -> Self {
        self.client_options = options;
        self
    }

    /// Builder: tolerate an SDK script that has not loaded yet
    pub fn with_async_sdk(mut self) -> Self {
        self.async_sdk = true;
        self
    }
}

/// Root propagation node owning the client handle for a component subtree
pub struct ScopeProvider {
    scope: ClientScope,
    api_key: Option<String>,
    warned_key_change: AtomicBool,
    /// Manual resolver, present only in `ClientSlot::Pending` mode
    resolver: Option<ReadySignal>,
    poll_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ScopeProvider {
    pub fn new(factory: &Arc<ClientFactory>, config: ProviderConfig) -> ElementsResult<Self> {
        match (config.api_key, config.client) {
            (Some(_), Some(_)) => Err(ElementsError::Configuration(
                "supply either an api key or a client handle, not both".to_string(),
            )),
            (None, None) => Err(ElementsError::Configuration(
                "either an api key or a client handle is required".to_string(),
            )),
            (Some(api_key), None) => {
                if factory.sdk_loaded() {
                    let client = factory.client(&api_key, &config.client_options)?;
                    Ok(Self::with_scope(ClientScope::Sync(client), Some(api_key)))
                } else if config.async_sdk {
                    let signal = ReadySignal::new();
                    let task = Self::spawn_sdk_poll(
                        factory.clone(),
                        api_key.clone(),
                        config.client_options,
                        signal.clone(),
                    );
                    Ok(Self {
                        scope: ClientScope::Async(signal),
                        api_key: Some(api_key),
                        warned_key_change: AtomicBool::new(false),
                        resolver: None,
                        poll_task: Mutex::new(Some(task)),
                    })
                } else {
                    Err(ElementsError::Configuration(
                        "payment SDK script is not loaded; load it before constructing \
                         the provider or enable async_sdk"
                            .to_string(),
                    ))
                }
            }
            (None, Some(ClientSlot::Ready(client))) => {
                Ok(Self::with_scope(ClientScope::Sync(client), None))
            }
            (None, Some(ClientSlot::Pending)) => {
                let signal = ReadySignal::new();
                Ok(Self {
                    scope: ClientScope::Async(signal.clone()),
                    api_key: None,
                    warned_key_change: AtomicBool::new(false),
                    resolver: Some(signal),
                    poll_task: Mutex::new(None),
                })
            }
        }
    }

    fn with_scope(scope: ClientScope, api_key: Option<String>) -> Self {
        Self {
            scope,
            api_key,
            warned_key_change: AtomicBool::new(false),
            resolver: None,
            poll_task: Mutex::new(None),
        }
    }

    fn spawn_sdk_poll(
        factory: Arc<ClientFactory>,
        api_key: String,
        client_options: Value,
        signal: ReadySignal,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ASYNC_CHECK_INTERVAL);
            loop {
                interval.tick().await;
                if factory.sdk_loaded() {
                    match factory.client(&api_key, &client_options) {
                        Ok(client) => signal.resolve(client),
                        Err(err) => {
                            error!(%err, "sdk became available but client construction failed");
                        }
                    }
                    return;
                }
            }
        })
    }

    /// Resolve a provider constructed with [`ClientSlot::Pending`]
    pub fn provide_client(&self, client: WidgetClient) {
        match &self.resolver {
            Some(signal) => signal.resolve(client),
            None => warn!("provide_client called on a provider that is not waiting for a client"),
        }
    }

    /// Scope value for descendants (no registry yet)
    pub fn scope(&self) -> Scope {
        Scope {
            client: self.scope.clone(),
            registry: None,
        }
    }

    pub fn client_scope(&self) -> &ClientScope {
        &self.scope
    }

    /// Changing credentials after construction is unsupported: the change is
    /// detected and diagnosed once, never applied
    pub fn set_api_key(&self, api_key: &str) {
        if self.api_key.as_deref() == Some(api_key) {
            return;
        }
        if !self.warned_key_change.swap(true, Ordering::Relaxed) {
            warn!("ScopeProvider does not support changing the api key after construction");
        }
    }

    /// Stop the background SDK poll, if one is running
    pub fn shutdown(&self) {
        if let Some(task) = lock(&self.poll_task).take() {
            task.abort();
        }
    }
}

impl Drop for ScopeProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}
