//! # Declarative Widget
//!
//! Declarative wrapper around one externally-owned widget instance.
//!
//! ```text
//!   Idle ──mount()──▶ Pending ──factory ready──▶ Mounted
//!    │                   │            │             │
//!    │                   │         create/mount     │
//!    │                   │          failed ▼        │
//!    └──────unmount()────┴───────▶ Dead    Failed ◀─┘ (never; terminal)
//! ```
//!
//! Mounting requests the registry's factory, creates the instance with the
//! declared options, wires event handlers, mounts it into the anchor and —
//! when the widget declares any capability — registers it for inference.
//! Unmounting destroys the instance and unregisters it; a widget torn down
//! while the factory is still resolving simply never attaches.

use crate::lock;
use crate::provider::Scope;
use crate::registry::{RegistrationEntry, WidgetRegistry};
use elements_core::{
    DomAnchor, ElementsError, ElementsResult, EventCallback, ImpliedCapability, WidgetEvent,
    WidgetFactoryHandle, WidgetHandle,
};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Callback receiving the live widget handle once it exists
pub type WidgetRefCallback = Arc<dyn Fn(&WidgetHandle) + Send + Sync>;

/// Per-mount configuration: creation options plus event handlers
#[derive(Clone, Default)]
pub struct WidgetConfig {
    /// Widget customization options forwarded to creation and updates
    pub options: Value,
    pub widget_ref: Option<WidgetRefCallback>,
    pub on_ready: Option<EventCallback>,
    pub on_change: Option<EventCallback>,
    pub on_blur: Option<EventCallback>,
    pub on_focus: Option<EventCallback>,
    pub on_click: Option<EventCallback>,
}

impl WidgetConfig {
    pub fn new(options: Value) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn with_widget_ref(mut self, callback: WidgetRefCallback) -> Self {
        self.widget_ref = Some(callback);
        self
    }

    pub fn with_on_ready(mut self, callback: EventCallback) -> Self {
        self.on_ready = Some(callback);
        self
    }

    pub fn with_on_change(mut self, callback: EventCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    pub fn with_on_blur(mut self, callback: EventCallback) -> Self {
        self.on_blur = Some(callback);
        self
    }

    pub fn with_on_focus(mut self, callback: EventCallback) -> Self {
        self.on_focus = Some(callback);
        self
    }

    pub fn with_on_click(mut self, callback: EventCallback) -> Self {
        self.on_click = Some(callback);
        self
    }
}

enum Phase {
    Idle,
    /// Mount requested; waiting for the factory
    Pending,
    Mounted {
        instance: WidgetHandle,
        applied_options: Value,
        creation_options: Value,
        registered: bool,
    },
    /// Unmounted; terminal
    Dead,
    /// Creation or mounting failed; terminal
    Failed(String),
}

struct WidgetState {
    phase: Phase,
    anchor: Option<DomAnchor>,
    config: WidgetConfig,
}

struct WidgetShared {
    kind: String,
    capability: ImpliedCapability,
    registry: WidgetRegistry,
    state: Mutex<WidgetState>,
}

/// Declarative handle to one widget within a registry scope
pub struct Widget {
    shared: Arc<WidgetShared>,
}

impl Widget {
    pub fn new(
        scope: &Scope,
        kind: impl Into<String>,
        capability: ImpliedCapability,
    ) -> ElementsResult<Self> {
        let Some(registry) = scope.registry() else {
            return Err(ElementsError::Scope {
                component: "Widget",
                required: "WidgetRegistry",
            });
        };
        Ok(Self {
            shared: Arc::new(WidgetShared {
                kind: kind.into(),
                capability,
                registry: registry.clone(),
                state: Mutex::new(WidgetState {
                    phase: Phase::Idle,
                    anchor: None,
                    config: WidgetConfig::default(),
                }),
            }),
        })
    }

    /// Combined card input: tokenizes cards, produces card sources and card
    /// payment methods
    pub fn card(scope: &Scope) -> ElementsResult<Self> {
        Self::new(
            scope,
            "card",
            ImpliedCapability::none()
                .with_token_type("card")
                .with_source_type("card")
                .with_payment_method_type("card"),
        )
    }

    /// Split card number field; carries the card capabilities for the group
    pub fn card_number(scope: &Scope) -> ElementsResult<Self> {
        Self::new(
            scope,
            "cardNumber",
            ImpliedCapability::none()
                .with_token_type("card")
                .with_source_type("card")
                .with_payment_method_type("card"),
        )
    }

    /// Split expiry field; companion to [`Widget::card_number`], no capability
    pub fn card_expiry(scope: &Scope) -> ElementsResult<Self> {
        Self::new(scope, "cardExpiry", ImpliedCapability::none())
    }

    /// Split CVC field; companion to [`Widget::card_number`], no capability
    pub fn card_cvc(scope: &Scope) -> ElementsResult<Self> {
        Self::new(scope, "cardCvc", ImpliedCapability::none())
    }

    pub fn postal_code(scope: &Scope) -> ElementsResult<Self> {
        Self::new(scope, "postalCode", ImpliedCapability::none())
    }

    /// IBAN input: tokenizes bank accounts, produces SEPA debit sources and
    /// payment methods
    pub fn iban(scope: &Scope) -> ElementsResult<Self> {
        Self::new(
            scope,
            "iban",
            ImpliedCapability::none()
                .with_token_type("bank_account")
                .with_source_type("sepa_debit")
                .with_payment_method_type("sepa_debit"),
        )
    }

    /// iDEAL bank selector: produces iDEAL sources and payment methods
    pub fn ideal_bank(scope: &Scope) -> ElementsResult<Self> {
        Self::new(
            scope,
            "idealBank",
            ImpliedCapability::none()
                .with_source_type("ideal")
                .with_payment_method_type("ideal"),
        )
    }

    /// Browser payment button; drives its own flow, so no capability
    pub fn payment_request_button(scope: &Scope) -> ElementsResult<Self> {
        Self::new(scope, "paymentRequestButton", ImpliedCapability::none())
    }

    pub fn kind(&self) -> &str {
        &self.shared.kind
    }

    /// Mount into the given anchor. Requests the registry factory; with a
    /// resolved client this completes synchronously, otherwise the widget
    /// attaches when the client arrives.
    pub fn mount(&self, anchor: DomAnchor, config: WidgetConfig) -> ElementsResult<()> {
        {
            let mut state = lock(&self.shared.state);
            match state.phase {
                Phase::Idle => {}
                Phase::Dead => {
                    return Err(ElementsError::Configuration(format!(
                        "widget `{}` was unmounted and cannot be mounted again",
                        self.shared.kind
                    )))
                }
                _ => {
                    return Err(ElementsError::Configuration(format!(
                        "widget `{}` is already mounted or mounting",
                        self.shared.kind
                    )))
                }
            }
            state.phase = Phase::Pending;
            state.anchor = Some(anchor);
            state.config = config;
        }

        let shared = self.shared.clone();
        self.shared
            .registry
            .request_factory(move |factory| attach(&shared, factory));

        // With a sync client the attach already ran; surface its failure here
        // instead of leaving it to be discovered later
        match &lock(&self.shared.state).phase {
            Phase::Failed(message) => Err(ElementsError::Sdk(message.clone())),
            _ => Ok(()),
        }
    }

    /// Apply new customization options to the mounted instance. Updates that
    /// change nothing are skipped; updates before the instance exists replace
    /// the pending creation options.
    pub fn update(&self, options: Value) {
        let call = {
            let mut state = lock(&self.shared.state);
            match &mut state.phase {
                Phase::Mounted {
                    instance,
                    applied_options,
                    creation_options,
                    ..
                } => {
                    let mut next = normalize_options(&options);
                    // Compared against creation, not last-applied: a dropped
                    // change must not poison later updates carrying the
                    // original value
                    if self.shared.kind == "paymentRequestButton"
                        && next.contains_key("paymentRequest")
                        && next.get("paymentRequest") != creation_options.get("paymentRequest")
                    {
                        warn!("`paymentRequest` is not a customizable property; ignoring change");
                        next.remove("paymentRequest");
                    }
                    if next.is_empty() {
                        None
                    } else {
                        let next = Value::Object(next);
                        if next == *applied_options {
                            None
                        } else {
                            *applied_options = next.clone();
                            Some((instance.clone(), next))
                        }
                    }
                }
                Phase::Idle | Phase::Pending => {
                    state.config.options = options;
                    None
                }
                Phase::Dead | Phase::Failed(_) => {
                    debug!(kind = %self.shared.kind, "update on a torn-down widget ignored");
                    None
                }
            }
        };
        if let Some((instance, next)) = call {
            instance.update(&next);
        }
    }

    /// Tear down: destroy the instance and remove it from inference. Safe to
    /// call at any phase; before the factory resolves it simply prevents the
    /// instance from ever being created.
    pub fn unmount(&self) {
        let torn_down = {
            let mut state = lock(&self.shared.state);
            match std::mem::replace(&mut state.phase, Phase::Dead) {
                Phase::Mounted {
                    instance,
                    registered,
                    ..
                } => Some((instance, registered)),
                _ => None,
            }
        };
        if let Some((instance, registered)) = torn_down {
            instance.destroy();
            if registered {
                self.shared.registry.unregister(&instance);
            }
        }
    }

    /// The live instance handle, if mounted
    pub fn instance(&self) -> Option<WidgetHandle> {
        match &lock(&self.shared.state).phase {
            Phase::Mounted { instance, .. } => Some(instance.clone()),
            _ => None,
        }
    }

    /// Message of a failed creation or mount, if any
    pub fn error(&self) -> Option<String> {
        match &lock(&self.shared.state).phase {
            Phase::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    pub fn is_mounted(&self) -> bool {
        matches!(lock(&self.shared.state).phase, Phase::Mounted { .. })
    }
}

impl Drop for Widget {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn normalize_options(options: &Value) -> Map<String, Value> {
    match options {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

/// Runs once the registry factory is available; a no-op if the widget was
/// torn down while waiting.
///
/// The state lock is never held across the SDK calls: the SDK is allowed to
/// emit `ready` synchronously from `mount`, and a handler may call back into
/// this widget. The `Pending` check is therefore repeated before committing,
/// and an instance orphaned by a concurrent unmount is destroyed.
fn attach(shared: &Arc<WidgetShared>, factory: WidgetFactoryHandle) {
    let (creation_options, anchor, config) = {
        let mut state = lock(&shared.state);
        if !matches!(state.phase, Phase::Pending) {
            debug!(kind = %shared.kind, "widget torn down before the factory resolved");
            return;
        }
        let Some(anchor) = state.anchor.clone() else {
            state.phase = Phase::Failed("mount requested without an anchor".to_string());
            return;
        };
        (
            Value::Object(normalize_options(&state.config.options)),
            anchor,
            state.config.clone(),
        )
    };

    let instance = match factory.create(&shared.kind, &creation_options) {
        Ok(instance) => instance,
        Err(err) => {
            warn!(kind = %shared.kind, %err, "widget creation failed");
            fail(shared, err.to_string());
            return;
        }
    };

    wire_events(&instance, &config);

    if let Err(err) = instance.mount(&anchor) {
        warn!(kind = %shared.kind, %err, "widget mount failed");
        fail(shared, err.to_string());
        return;
    }

    let mut state = lock(&shared.state);
    if !matches!(state.phase, Phase::Pending) {
        drop(state);
        debug!(kind = %shared.kind, "widget torn down while attaching; destroying the instance");
        instance.destroy();
        return;
    }
    let registered = !shared.capability.is_empty();
    if registered {
        shared
            .registry
            .register(RegistrationEntry::new(instance.clone(), &shared.capability));
    }
    state.phase = Phase::Mounted {
        instance,
        applied_options: creation_options.clone(),
        creation_options,
        registered,
    };
}

/// Record a creation or mount failure, unless a teardown already won
fn fail(shared: &Arc<WidgetShared>, message: String) {
    let mut state = lock(&shared.state);
    if matches!(state.phase, Phase::Pending) {
        state.phase = Phase::Failed(message);
    }
}

fn wire_events(instance: &WidgetHandle, config: &WidgetConfig) {
    if let Some(widget_ref) = config.widget_ref.clone() {
        let handle = instance.clone();
        instance.on(
            WidgetEvent::Ready,
            Arc::new(move |_payload| widget_ref(&handle)),
        );
    }
    let wired: [(WidgetEvent, &Option<EventCallback>); 5] = [
        (WidgetEvent::Ready, &config.on_ready),
        (WidgetEvent::Change, &config.on_change),
        (WidgetEvent::Blur, &config.on_blur),
        (WidgetEvent::Focus, &config.on_focus),
        (WidgetEvent::Click, &config.on_click),
    ];
    for (event, callback) in wired {
        if let Some(callback) = callback.clone() {
            instance.on(event, callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ClientScope, ReadySignal};
    use elements_core::FactoryOptions;
    use elements_mock::{MockClient, MockWidget};
    use serde_json::json;

    fn sync_registry() -> (WidgetRegistry, Arc<MockClient>) {
        let (client, mock) = MockClient::handle("pk_test_widget");
        let scope = Scope {
            client: ClientScope::Sync(client),
            registry: None,
        };
        (WidgetRegistry::new(&scope, FactoryOptions::new()), mock)
    }

    fn mounted_mock(mock: &MockClient, index: usize) -> Arc<MockWidget> {
        mock.factories()[0].created()[index].clone()
    }

    #[test]
    fn test_requires_registry_scope() {
        let (client, _mock) = MockClient::handle("pk_test_widget");
        let scope = Scope {
            client: ClientScope::Sync(client),
            registry: None,
        };
        let err = Widget::card(&scope).err().expect("expected error");
        assert!(matches!(
            err,
            ElementsError::Scope {
                component: "Widget",
                ..
            }
        ));
    }

    #[test]
    fn test_mount_creates_wires_and_registers() {
        let (registry, mock) = sync_registry();
        let widget = Widget::card(&registry.scope()).unwrap();

        widget
            .mount(
                DomAnchor::new("card-anchor"),
                WidgetConfig::new(json!({"hidePostalCode": true})),
            )
            .unwrap();

        assert!(widget.is_mounted());
        let instance = mounted_mock(&mock, 0);
        assert_eq!(instance.kind(), "card");
        assert_eq!(instance.creation_options(), &json!({"hidePostalCode": true}));
        assert_eq!(instance.mounted_at(), Some(DomAnchor::new("card-anchor")));

        let entries = registry.list_registered();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].implied_token_type.as_deref(), Some("card"));
        assert_eq!(entries[0].implied_source_type.as_deref(), Some("card"));
        assert_eq!(
            entries[0].implied_payment_method_type.as_deref(),
            Some("card")
        );
    }

    #[test]
    fn test_no_capability_widgets_do_not_register() {
        let (registry, _mock) = sync_registry();
        let expiry = Widget::card_expiry(&registry.scope()).unwrap();
        let cvc = Widget::card_cvc(&registry.scope()).unwrap();

        expiry
            .mount(DomAnchor::new("expiry"), WidgetConfig::default())
            .unwrap();
        cvc.mount(DomAnchor::new("cvc"), WidgetConfig::default())
            .unwrap();

        assert!(expiry.is_mounted());
        assert!(cvc.is_mounted());
        assert!(registry.list_registered().is_empty());
    }

    #[test]
    fn test_double_mount_is_rejected() {
        let (registry, _mock) = sync_registry();
        let widget = Widget::card(&registry.scope()).unwrap();

        widget
            .mount(DomAnchor::new("a"), WidgetConfig::default())
            .unwrap();
        let err = widget
            .mount(DomAnchor::new("b"), WidgetConfig::default())
            .unwrap_err();
        assert!(matches!(err, ElementsError::Configuration(_)));
    }

    #[test]
    fn test_update_skips_noops_and_guards_payment_request() {
        let (registry, mock) = sync_registry();
        let widget = Widget::card(&registry.scope()).unwrap();
        widget
            .mount(
                DomAnchor::new("card"),
                WidgetConfig::new(json!({"style": {"base": {"fontSize": "16px"}}})),
            )
            .unwrap();
        let instance = mounted_mock(&mock, 0);

        // Identical options: no SDK call
        widget.update(json!({"style": {"base": {"fontSize": "16px"}}}));
        assert!(instance.updates().is_empty());

        // Empty options: no SDK call
        widget.update(json!({}));
        widget.update(Value::Null);
        assert!(instance.updates().is_empty());

        // A real change goes through once
        widget.update(json!({"style": {"base": {"fontSize": "18px"}}}));
        assert_eq!(
            instance.updates(),
            vec![json!({"style": {"base": {"fontSize": "18px"}}})]
        );

        let button = Widget::payment_request_button(&registry.scope()).unwrap();
        button
            .mount(
                DomAnchor::new("button"),
                WidgetConfig::new(json!({"paymentRequest": {"id": "pr_1"}})),
            )
            .unwrap();
        let button_instance = mounted_mock(&mock, 1);

        // Swapping the payment request after mount is not supported; the
        // offending key is dropped and the rest applied
        button.update(json!({"paymentRequest": {"id": "pr_2"}, "style": {"type": "dark"}}));
        assert_eq!(
            button_instance.updates(),
            vec![json!({"style": {"type": "dark"}})]
        );

        // A later update carrying the creation-time value is not a change;
        // the earlier dropped swap must not poison it
        button.update(json!({"paymentRequest": {"id": "pr_1"}, "style": {"type": "light"}}));
        assert_eq!(
            button_instance.updates()[1],
            json!({"paymentRequest": {"id": "pr_1"}, "style": {"type": "light"}})
        );
    }

    #[test]
    fn test_kind_built_at_runtime() {
        let (registry, _mock) = sync_registry();
        let kind = ["card", "Cvc"].concat();
        let widget = Widget::new(&registry.scope(), kind, ImpliedCapability::none()).unwrap();
        assert_eq!(widget.kind(), "cardCvc");

        widget
            .mount(DomAnchor::new("cvc"), WidgetConfig::default())
            .unwrap();
        assert!(widget.is_mounted());
    }

    #[test]
    fn test_ready_emitted_inside_mount_can_reenter_the_widget() {
        let (client, mock) = MockClient::handle("pk_test_widget");
        mock.set_emit_ready_on_mount(true);
        let scope = Scope {
            client: ClientScope::Sync(client),
            registry: None,
        };
        let registry = WidgetRegistry::new(&scope, FactoryOptions::new());
        let widget = Arc::new(Widget::card(&registry.scope()).unwrap());

        let observed = Arc::new(Mutex::new(None));
        let handle = widget.clone();
        let sink = observed.clone();
        widget
            .mount(
                DomAnchor::new("card"),
                WidgetConfig::default()
                    .with_on_ready(Arc::new(move |_| *lock(&sink) = Some(handle.is_mounted()))),
            )
            .unwrap();

        // The handler ran mid-mount, before the commit to the mounted phase
        assert_eq!(*lock(&observed), Some(false));
        assert!(widget.is_mounted());
    }

    #[test]
    fn test_unmount_from_ready_handler_destroys_the_instance() {
        let (client, mock) = MockClient::handle("pk_test_widget");
        mock.set_emit_ready_on_mount(true);
        let scope = Scope {
            client: ClientScope::Sync(client),
            registry: None,
        };
        let registry = WidgetRegistry::new(&scope, FactoryOptions::new());
        let widget = Arc::new(Widget::card(&registry.scope()).unwrap());

        let handle = widget.clone();
        widget
            .mount(
                DomAnchor::new("card"),
                WidgetConfig::default().with_on_ready(Arc::new(move |_| handle.unmount())),
            )
            .unwrap();

        assert!(!widget.is_mounted());
        let instance = mounted_mock(&mock, 0);
        assert!(instance.is_destroyed());
        assert!(registry.list_registered().is_empty());
    }

    #[test]
    fn test_update_before_attach_replaces_creation_options() {
        let signal = ReadySignal::new();
        let scope = Scope {
            client: ClientScope::Async(signal.clone()),
            registry: None,
        };
        let registry = WidgetRegistry::new(&scope, FactoryOptions::new());
        let widget = Widget::card(&registry.scope()).unwrap();

        widget
            .mount(
                DomAnchor::new("card"),
                WidgetConfig::new(json!({"hidePostalCode": false})),
            )
            .unwrap();
        widget.update(json!({"hidePostalCode": true}));

        let (client, mock) = MockClient::handle("pk_test_widget");
        signal.resolve(client);

        assert!(widget.is_mounted());
        let instance = mock.factories()[0].created()[0].clone();
        assert_eq!(instance.creation_options(), &json!({"hidePostalCode": true}));
        assert!(instance.updates().is_empty());
    }

    #[test]
    fn test_unmount_destroys_and_unregisters() {
        let (registry, mock) = sync_registry();
        let widget = Widget::iban(&registry.scope()).unwrap();
        widget
            .mount(DomAnchor::new("iban"), WidgetConfig::default())
            .unwrap();
        assert_eq!(registry.list_registered().len(), 1);

        widget.unmount();

        let instance = mounted_mock(&mock, 0);
        assert!(instance.is_destroyed());
        assert!(registry.list_registered().is_empty());
        assert!(!widget.is_mounted());

        // Unmounting twice is harmless
        widget.unmount();
    }

    #[test]
    fn test_unmount_before_factory_resolves_never_attaches() {
        let signal = ReadySignal::new();
        let scope = Scope {
            client: ClientScope::Async(signal.clone()),
            registry: None,
        };
        let registry = WidgetRegistry::new(&scope, FactoryOptions::new());
        let widget = Widget::card(&registry.scope()).unwrap();

        widget
            .mount(DomAnchor::new("card"), WidgetConfig::default())
            .unwrap();
        widget.unmount();

        let (client, mock) = MockClient::handle("pk_test_widget");
        signal.resolve(client);

        // Factory gets created (the request was already queued) but no widget
        assert_eq!(mock.factories().len(), 1);
        assert!(mock.factories()[0].created().is_empty());
        assert!(!widget.is_mounted());
        assert!(registry.list_registered().is_empty());
    }

    #[test]
    fn test_unknown_kind_surfaces_synchronously() {
        let (registry, _mock) = sync_registry();
        let widget =
            Widget::new(&registry.scope(), "hologram", ImpliedCapability::none()).unwrap();

        let err = widget
            .mount(DomAnchor::new("anchor"), WidgetConfig::default())
            .unwrap_err();
        assert!(matches!(err, ElementsError::Sdk(_)));
        assert_eq!(widget.error().unwrap(), "sdk error: unknown widget kind `hologram`");
    }

    #[test]
    fn test_event_handlers_and_widget_ref() {
        let (registry, mock) = sync_registry();
        let widget = Widget::card(&registry.scope()).unwrap();

        let changes = Arc::new(Mutex::new(Vec::new()));
        let refs = Arc::new(Mutex::new(0u32));
        let change_sink = changes.clone();
        let ref_sink = refs.clone();

        widget
            .mount(
                DomAnchor::new("card"),
                WidgetConfig::default()
                    .with_on_change(Arc::new(move |payload| {
                        lock(&change_sink).push(payload.clone())
                    }))
                    .with_widget_ref(Arc::new(move |_handle| *lock(&ref_sink) += 1)),
            )
            .unwrap();

        let instance = mounted_mock(&mock, 0);
        instance.emit(WidgetEvent::Ready, &Value::Null);
        instance.emit(WidgetEvent::Change, &json!({"complete": false}));
        instance.emit(WidgetEvent::Change, &json!({"complete": true}));

        assert_eq!(*lock(&refs), 1);
        assert_eq!(
            lock(&changes).clone(),
            vec![json!({"complete": false}), json!({"complete": true})]
        );
    }
}
