//! # elements-mock
//!
//! In-memory implementation of the SDK boundary, used by the binding layer's
//! test suites. Every artifact call is recorded with the exact target and
//! options forwarded across the boundary, so tests can assert on call shapes
//! instead of side effects.

use async_trait::async_trait;
use elements_core::{
    CallTarget, ClientHandle, DomAnchor, ElementsError, ElementsResult, EventCallback, SdkPayload,
    SdkRuntime, WidgetClient, WidgetEvent, WidgetFactory, WidgetFactoryHandle, WidgetHandle,
    WidgetInstance, COMPONENT_NAME_KEY, FRAME_ID_KEY,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Widget kinds the mock SDK recognizes
pub const KNOWN_KINDS: &[&str] = &[
    "card",
    "cardNumber",
    "cardExpiry",
    "cardCvc",
    "postalCode",
    "iban",
    "idealBank",
    "paymentRequestButton",
];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shape summary of the target forwarded to a client method
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedTarget {
    Widget { frame_id: String },
    Reference(Value),
    Data(Value),
    None,
}

impl RecordedTarget {
    fn summarize(target: &CallTarget) -> Self {
        match target {
            CallTarget::Widget(widget) => RecordedTarget::Widget {
                frame_id: widget
                    .reference()
                    .get(FRAME_ID_KEY)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            CallTarget::Reference(value) => RecordedTarget::Reference(value.clone()),
            CallTarget::Data(value) => RecordedTarget::Data(value.clone()),
            CallTarget::None => RecordedTarget::None,
        }
    }
}

/// One artifact call as it crossed the SDK boundary
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub target: RecordedTarget,
    pub options: Value,
    /// Method-specific extras: `{"type": ...}` for payment methods,
    /// `{"client_secret": ...}` for confirmations, `Null` otherwise
    pub detail: Value,
}

/// Host-environment stand-in for the SDK script tag
pub struct MockRuntime {
    loaded: AtomicBool,
    clients_built: AtomicUsize,
}

impl MockRuntime {
    /// A runtime whose SDK script has already loaded
    pub fn new() -> Self {
        Self {
            loaded: AtomicBool::new(true),
            clients_built: AtomicUsize::new(0),
        }
    }

    /// A runtime whose SDK script has not loaded yet
    pub fn unloaded() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            clients_built: AtomicUsize::new(0),
        }
    }

    /// Simulate the SDK script tag finishing (or being removed)
    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::SeqCst);
    }

    /// Number of client handles this runtime has instantiated
    pub fn clients_built(&self) -> usize {
        self.clients_built.load(Ordering::SeqCst)
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SdkRuntime for MockRuntime {
    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn instantiate(&self, api_key: &str, options: &Value) -> WidgetClient {
        self.clients_built.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockClient::new(api_key, options.clone()))
    }
}

/// Recording client handle
pub struct MockClient {
    api_key: String,
    client_options: Value,
    calls: Mutex<Vec<RecordedCall>>,
    factories: Mutex<Vec<Arc<MockFactory>>>,
    queued_payloads: Mutex<Vec<SdkPayload>>,
    sync_ready: AtomicBool,
}

impl MockClient {
    pub fn new(api_key: &str, client_options: Value) -> Self {
        Self {
            api_key: api_key.to_string(),
            client_options,
            calls: Mutex::new(Vec::new()),
            factories: Mutex::new(Vec::new()),
            queued_payloads: Mutex::new(Vec::new()),
            sync_ready: AtomicBool::new(false),
        }
    }

    /// Make widgets built through this client emit `ready` synchronously
    /// from inside `mount`, as some SDK builds do
    pub fn set_emit_ready_on_mount(&self, enabled: bool) {
        self.sync_ready.store(enabled, Ordering::SeqCst);
    }

    /// Convenience: a ready-to-share client handle
    pub fn handle(api_key: &str) -> (WidgetClient, Arc<MockClient>) {
        let client = Arc::new(MockClient::new(api_key, Value::Null));
        (client.clone(), client)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn client_options(&self) -> &Value {
        &self.client_options
    }

    /// All recorded artifact calls, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, method: &str) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    /// Factories built through this client (the binding layer promises at
    /// most one per registry scope)
    pub fn factories(&self) -> Vec<Arc<MockFactory>> {
        lock(&self.factories).clone()
    }

    /// Queue the payload the next artifact call resolves with — including an
    /// SDK-level `{error}` body, which the binding layer must pass through
    pub fn queue_payload(&self, payload: SdkPayload) {
        lock(&self.queued_payloads).push(payload);
    }

    fn record(
        &self,
        method: &'static str,
        target: &CallTarget,
        options: &Value,
        detail: Value,
    ) -> SdkPayload {
        lock(&self.calls).push(RecordedCall {
            method,
            target: RecordedTarget::summarize(target),
            options: options.clone(),
            detail,
        });

        let queued = {
            let mut payloads = lock(&self.queued_payloads);
            if payloads.is_empty() {
                None
            } else {
                Some(payloads.remove(0))
            }
        };
        queued.unwrap_or_else(|| default_payload(method))
    }
}

fn default_payload(method: &str) -> SdkPayload {
    match method {
        "create_token" => json!({"token": {"id": "tok_mock", "object": "token"}}),
        "create_source" => json!({"source": {"id": "src_mock", "object": "source"}}),
        "create_payment_method" => {
            json!({"paymentMethod": {"id": "pm_mock", "object": "payment_method"}})
        }
        "confirm_card_payment" => {
            json!({"paymentIntent": {"id": "pi_mock", "status": "succeeded"}})
        }
        "confirm_card_setup" => json!({"setupIntent": {"id": "seti_mock", "status": "succeeded"}}),
        other => json!({"object": other}),
    }
}

#[async_trait]
impl ClientHandle for MockClient {
    fn create_widget_factory(&self, options: &Value) -> WidgetFactoryHandle {
        let factory = Arc::new(
            MockFactory::new(options.clone())
                .with_sync_ready(self.sync_ready.load(Ordering::SeqCst)),
        );
        lock(&self.factories).push(factory.clone());
        factory
    }

    async fn create_token(&self, target: CallTarget, options: Value) -> SdkPayload {
        self.record("create_token", &target, &options, Value::Null)
    }

    async fn create_source(&self, target: CallTarget, options: Value) -> SdkPayload {
        self.record("create_source", &target, &options, Value::Null)
    }

    async fn create_payment_method(
        &self,
        method_type: &str,
        target: CallTarget,
        data: Value,
    ) -> SdkPayload {
        self.record(
            "create_payment_method",
            &target,
            &data,
            json!({"type": method_type}),
        )
    }

    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        target: CallTarget,
        data: Value,
    ) -> SdkPayload {
        self.record(
            "confirm_card_payment",
            &target,
            &data,
            json!({"client_secret": client_secret}),
        )
    }

    async fn confirm_card_setup(
        &self,
        client_secret: &str,
        target: CallTarget,
        data: Value,
    ) -> SdkPayload {
        self.record(
            "confirm_card_setup",
            &target,
            &data,
            json!({"client_secret": client_secret}),
        )
    }
}

/// Recording widget factory
pub struct MockFactory {
    factory_options: Value,
    created: Mutex<Vec<Arc<MockWidget>>>,
    next_frame: AtomicUsize,
    sync_ready: bool,
}

impl MockFactory {
    pub fn new(factory_options: Value) -> Self {
        Self {
            factory_options,
            created: Mutex::new(Vec::new()),
            next_frame: AtomicUsize::new(0),
            sync_ready: false,
        }
    }

    /// Builder: widgets from this factory emit `ready` inside `mount`
    pub fn with_sync_ready(mut self, enabled: bool) -> Self {
        self.sync_ready = enabled;
        self
    }

    pub fn factory_options(&self) -> &Value {
        &self.factory_options
    }

    /// Widgets created through this factory, in creation order
    pub fn created(&self) -> Vec<Arc<MockWidget>> {
        lock(&self.created).clone()
    }
}

impl WidgetFactory for MockFactory {
    fn create(&self, kind: &str, options: &Value) -> ElementsResult<WidgetHandle> {
        if !KNOWN_KINDS.contains(&kind) {
            return Err(ElementsError::Sdk(format!("unknown widget kind `{kind}`")));
        }
        let frame = self.next_frame.fetch_add(1, Ordering::SeqCst);
        let widget = Arc::new(
            MockWidget::new(kind, format!("frame_{frame}"), options.clone())
                .with_sync_ready(self.sync_ready),
        );
        lock(&self.created).push(widget.clone());
        Ok(widget)
    }
}

/// Recording widget instance
pub struct MockWidget {
    kind: String,
    frame_id: String,
    creation_options: Value,
    mounted_at: Mutex<Option<DomAnchor>>,
    destroyed: AtomicBool,
    updates: Mutex<Vec<Value>>,
    handlers: Mutex<HashMap<WidgetEvent, Vec<EventCallback>>>,
    sync_ready: bool,
}

impl MockWidget {
    pub fn new(kind: &str, frame_id: String, creation_options: Value) -> Self {
        Self {
            kind: kind.to_string(),
            frame_id,
            creation_options,
            mounted_at: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            updates: Mutex::new(Vec::new()),
            handlers: Mutex::new(HashMap::new()),
            sync_ready: false,
        }
    }

    /// Builder: emit `ready` synchronously from inside `mount`
    pub fn with_sync_ready(mut self, enabled: bool) -> Self {
        self.sync_ready = enabled;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn creation_options(&self) -> &Value {
        &self.creation_options
    }

    pub fn mounted_at(&self) -> Option<DomAnchor> {
        lock(&self.mounted_at).clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Options forwarded through `update`, in call order
    pub fn updates(&self) -> Vec<Value> {
        lock(&self.updates).clone()
    }

    /// Fire an event the way the SDK would
    pub fn emit(&self, event: WidgetEvent, payload: &Value) {
        let handlers = lock(&self.handlers).get(&event).cloned().unwrap_or_default();
        for handler in handlers {
            handler(payload);
        }
    }
}

impl WidgetInstance for MockWidget {
    fn mount(&self, anchor: &DomAnchor) -> ElementsResult<()> {
        if self.is_destroyed() {
            return Err(ElementsError::Sdk(format!(
                "cannot mount destroyed widget `{}`",
                self.frame_id
            )));
        }
        let mut mounted = lock(&self.mounted_at);
        if mounted.is_some() {
            return Err(ElementsError::Sdk(format!(
                "widget `{}` is already mounted",
                self.frame_id
            )));
        }
        *mounted = Some(anchor.clone());
        drop(mounted);
        if self.sync_ready {
            self.emit(WidgetEvent::Ready, &Value::Null);
        }
        Ok(())
    }

    fn update(&self, options: &Value) {
        lock(&self.updates).push(options.clone());
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        *lock(&self.mounted_at) = None;
    }

    fn on(&self, event: WidgetEvent, handler: EventCallback) {
        lock(&self.handlers).entry(event).or_default().push(handler);
    }

    fn reference(&self) -> Value {
        let mut reference = Map::new();
        reference.insert(FRAME_ID_KEY.to_string(), json!(self.frame_id));
        reference.insert(COMPONENT_NAME_KEY.to_string(), json!(self.kind));
        Value::Object(reference)
    }
}
