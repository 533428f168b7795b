//! # elements-bind
//!
//! Declarative binding layer over an imperative, DOM-mounted payment-widget
//! SDK. The SDK itself is consumed behind the traits in `elements-core`;
//! this crate owns everything declarative:
//!
//! - [`ClientFactory`] — memoized construction of client handles
//! - [`ScopeProvider`] — root propagation node publishing a client handle,
//!   synchronously or through a readiness signal
//! - [`WidgetRegistry`] — lazy, memoized widget-factory resolution plus the
//!   live list of mounted widgets and their implied capabilities
//! - [`Widget`] — declarative wrapper around one mounted widget instance
//! - [`Injector`] / [`ArtifactClient`] — artifact-creation wrappers that
//!   infer the target widget from the registry
//!
//! ## Example
//!
//! ```rust,ignore
//! use elements_bind::{ClientFactory, Injector, InjectOptions, ProviderConfig,
//!     ScopeProvider, Widget, WidgetConfig, WidgetRegistry};
//! use elements_core::{DomAnchor, FactoryOptions};
//!
//! let factory = ClientFactory::new(runtime);
//! let provider = ScopeProvider::new(&factory, ProviderConfig::api_key("pk_live_x"))?;
//! let registry = WidgetRegistry::new(&provider.scope(), FactoryOptions::new());
//!
//! let card = Widget::card(&registry.scope())?;
//! card.mount(DomAnchor::new("card-anchor"), WidgetConfig::default())?;
//!
//! let injector = Injector::new(&registry.scope(), InjectOptions::default())?;
//! let stripe = injector.artifact_client().unwrap();
//! let token = stripe.create_token(serde_json::json!({}))?.await;
//! ```

pub mod client;
pub mod inject;
pub mod provider;
pub mod registry;
pub mod widget;

// Re-exports for convenience
pub use client::ClientFactory;
pub use inject::{ArtifactClient, InjectOptions, Injector};
pub use provider::{ClientScope, ClientSlot, ProviderConfig, ReadySignal, Scope, ScopeProvider};
pub use registry::{RegistrationEntry, WidgetRegistry};
pub use widget::{Widget, WidgetConfig, WidgetRefCallback};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, riding through poisoning: registry and widget state stay
/// usable even if a handler panicked on another thread
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
