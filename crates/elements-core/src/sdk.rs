//! # SDK Boundary
//!
//! Traits describing the surface of the external payment SDK. The binding
//! layer consumes these; it never reimplements widget rendering, network
//! calls, or the SDK's PCI-relevant isolation.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ClientHandle (trait)                     │
//! │  ├── create_widget_factory()                                 │
//! │  ├── create_token() / create_source()                        │
//! │  ├── create_payment_method()                                 │
//! │  └── confirm_card_payment() / confirm_card_setup()           │
//! └──────────────────────────────────────────────────────────────┘
//!               │ creates
//!               ▼
//!      WidgetFactory (trait) ──create──▶ WidgetInstance (trait)
//! ```
//!
//! Artifact operations resolve with an opaque [`SdkPayload`]. When the SDK
//! reports a failure asynchronously it does so *inside* that payload (an
//! `{error}` object); the binding layer forwards it untouched.

use crate::error::ElementsResult;
use crate::target::CallTarget;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Opaque payload resolved by an SDK artifact operation, `{error}` bodies
/// included
pub type SdkPayload = Value;

/// An in-flight SDK artifact operation
pub type SdkCall = Pin<Box<dyn Future<Output = SdkPayload> + Send>>;

/// Shared handle to an authenticated SDK session
pub type WidgetClient = Arc<dyn ClientHandle>;

/// Shared handle to a widget factory scoped to one registry
pub type WidgetFactoryHandle = Arc<dyn WidgetFactory>;

/// Shared handle to one externally-owned, mounted widget
pub type WidgetHandle = Arc<dyn WidgetInstance>;

/// Handler invoked with the event payload when a widget emits an event
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifier of the DOM node the host environment hands us to mount a
/// widget into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomAnchor(pub String);

impl DomAnchor {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self(node_id.into())
    }
}

/// Events a mounted widget emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetEvent {
    Ready,
    Change,
    Blur,
    Focus,
    Click,
}

impl WidgetEvent {
    /// Wire name used by the external SDK
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetEvent::Ready => "ready",
            WidgetEvent::Change => "change",
            WidgetEvent::Blur => "blur",
            WidgetEvent::Focus => "focus",
            WidgetEvent::Click => "click",
        }
    }
}

/// Authenticated session with the external payment service.
///
/// Owned by the scope provider, shared read-only with all descendants.
#[async_trait]
pub trait ClientHandle: Send + Sync {
    /// Instantiate a widget factory (`elements()` in SDK terms). The binding
    /// layer guarantees at most one call per registry scope.
    fn create_widget_factory(&self, options: &Value) -> WidgetFactoryHandle;

    async fn create_token(&self, target: CallTarget, options: Value) -> SdkPayload;

    async fn create_source(&self, target: CallTarget, options: Value) -> SdkPayload;

    async fn create_payment_method(
        &self,
        method_type: &str,
        target: CallTarget,
        data: Value,
    ) -> SdkPayload;

    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        target: CallTarget,
        data: Value,
    ) -> SdkPayload;

    async fn confirm_card_setup(
        &self,
        client_secret: &str,
        target: CallTarget,
        data: Value,
    ) -> SdkPayload;
}

/// Instantiates widgets within one registry scope
pub trait WidgetFactory: Send + Sync {
    /// Create a widget of the given kind. An unrecognized kind is the SDK's
    /// failure to signal; it is propagated, never swallowed.
    fn create(&self, kind: &str, options: &Value) -> ElementsResult<WidgetHandle>;
}

/// Externally-owned handle to one mounted widget UI
pub trait WidgetInstance: Send + Sync {
    /// Mount into the anchor. The SDK may emit `ready` to registered
    /// handlers before this returns; callers must not hold locks a handler
    /// could contend on.
    fn mount(&self, anchor: &DomAnchor) -> ElementsResult<()>;

    fn update(&self, options: &Value);

    fn destroy(&self);

    fn on(&self, event: WidgetEvent, handler: EventCallback);

    /// Serialized reference to this widget, carrying the frame identifier and
    /// component-name markers checked by [`crate::is_widget_reference`]
    fn reference(&self) -> Value;
}

/// Host-environment hook standing in for the SDK script tag: reports whether
/// the SDK has loaded and builds client handles once it has
pub trait SdkRuntime: Send + Sync {
    fn is_loaded(&self) -> bool;

    fn instantiate(&self, api_key: &str, options: &Value) -> WidgetClient;
}
