//! # Widget Registry
//!
//! Groups widgets into one factory scope and tracks which widgets are
//! currently mounted along with the artifact capabilities they declared.
//! The factory itself is created lazily: the first widget asking for it
//! triggers exactly one `create_widget_factory` call once the client
//! resolves, and every subsequent request receives the cached handle.

use crate::lock;
use crate::provider::{ClientScope, Scope};
use elements_core::{FactoryOptions, ImpliedCapability, WidgetFactoryHandle, WidgetHandle};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One mounted widget and its declared artifact capabilities
#[derive(Clone)]
pub struct RegistrationEntry {
    pub widget: WidgetHandle,
    pub implied_token_type: Option<String>,
    pub implied_source_type: Option<String>,
    pub implied_payment_method_type: Option<String>,
}

impl RegistrationEntry {
    pub fn new(widget: WidgetHandle, capability: &ImpliedCapability) -> Self {
        Self {
            widget,
            implied_token_type: capability.token_type.clone(),
            implied_source_type: capability.source_type.clone(),
            implied_payment_method_type: capability.payment_method_type.clone(),
        }
    }
}

type FactoryCallback = Box<dyn FnOnce(WidgetFactoryHandle) + Send>;

enum FactoryState {
    /// No widget has asked for the factory yet
    Idle,
    /// Creation is in flight behind the client scope; callers queue here
    Waiting(Vec<FactoryCallback>),
    Ready(WidgetFactoryHandle),
}

struct RegistryInner {
    client: ClientScope,
    factory_options: FactoryOptions,
    factory: Mutex<FactoryState>,
    /// Immutable snapshots swapped atomically, so inference iterates a
    /// consistent list even while widgets mount and unmount
    entries: Mutex<Arc<Vec<RegistrationEntry>>>,
}

/// Shared registry handle; clones refer to the same scope
#[derive(Clone)]
pub struct WidgetRegistry {
    inner: Arc<RegistryInner>,
}

// Trait-object Arcs are compared as thin data pointers; two handles to the
// same widget instance always compare equal
fn same_widget(a: &WidgetHandle, b: &WidgetHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const u8,
        Arc::as_ptr(b) as *const u8,
    )
}

impl WidgetRegistry {
    pub fn new(scope: &Scope, factory_options: FactoryOptions) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                client: scope.client.clone(),
                factory_options,
                factory: Mutex::new(FactoryState::Idle),
                entries: Mutex::new(Arc::new(Vec::new())),
            }),
        }
    }

    /// Scope value for descendants of this registry
    pub fn scope(&self) -> Scope {
        Scope {
            client: self.inner.client.clone(),
            registry: Some(self.clone()),
        }
    }

    /// Request the factory; the callback fires exactly once, synchronously
    /// when the factory already exists
    pub fn request_factory(&self, callback: impl FnOnce(WidgetFactoryHandle) + Send + 'static) {
        let first_request = {
            let mut state = lock(&self.inner.factory);
            match &mut *state {
                FactoryState::Ready(factory) => {
                    let factory = factory.clone();
                    drop(state);
                    callback(factory);
                    return;
                }
                FactoryState::Waiting(queue) => {
                    queue.push(Box::new(callback));
                    false
                }
                FactoryState::Idle => {
                    *state = FactoryState::Waiting(vec![Box::new(callback)]);
                    true
                }
            }
        };

        if first_request {
            let registry = self.clone();
            self.inner.client.on_ready(move |client| {
                debug!("creating widget factory for registry scope");
                let factory =
                    client.create_widget_factory(&registry.inner.factory_options.to_value());
                registry.install_factory(factory);
            });
        }
    }

    fn install_factory(&self, factory: WidgetFactoryHandle) {
        let queued = {
            let mut state = lock(&self.inner.factory);
            match std::mem::replace(&mut *state, FactoryState::Ready(factory.clone())) {
                FactoryState::Waiting(queue) => queue,
                FactoryState::Idle => Vec::new(),
                FactoryState::Ready(first) => {
                    debug!("widget factory already installed; keeping the first one");
                    *state = FactoryState::Ready(first);
                    return;
                }
            }
        };
        for callback in queued {
            callback(factory.clone());
        }
    }

    /// The cached factory, if it has been created
    pub fn factory(&self) -> Option<WidgetFactoryHandle> {
        match &*lock(&self.inner.factory) {
            FactoryState::Ready(factory) => Some(factory.clone()),
            _ => None,
        }
    }

    /// Add a mounted widget to the inference list
    pub fn register(&self, entry: RegistrationEntry) {
        let mut entries = lock(&self.inner.entries);
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push(entry);
        *entries = Arc::new(next);
    }

    /// Remove a widget by instance identity; unknown widgets are a no-op
    pub fn unregister(&self, widget: &WidgetHandle) {
        let mut entries = lock(&self.inner.entries);
        if !entries.iter().any(|entry| same_widget(&entry.widget, widget)) {
            return;
        }
        let next: Vec<RegistrationEntry> = entries
            .iter()
            .filter(|entry| !same_widget(&entry.widget, widget))
            .cloned()
            .collect();
        *entries = Arc::new(next);
    }

    /// Consistent snapshot of the currently registered widgets
    pub fn list_registered(&self) -> Arc<Vec<RegistrationEntry>> {
        lock(&self.inner.entries).clone()
    }
}
