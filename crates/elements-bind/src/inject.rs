//! # Capability Injection
//!
//! Wraps the raw client's artifact operations with inference against the
//! enclosing registry: callers say *what* they want (a token, a source, a
//! payment method) and the wrapper works out *which* mounted widget supplies
//! it. Exactly one match forwards that widget; several matches always fail;
//! zero matches either fall back to a widget-less call (sources, payment
//! methods, confirmations — the caller may hold a saved artifact) or fail
//! (tokens, which cannot be created without a widget).
//!
//! Inference faults are raised synchronously from the wrapper, before any
//! future exists. SDK-level `{error}` payloads resolved by the calls
//! themselves pass through untouched.

use crate::lock;
use crate::provider::Scope;
use crate::registry::{RegistrationEntry, WidgetRegistry};
use elements_core::{
    is_widget_reference, CallTarget, ElementsError, ElementsResult, SdkCall, WidgetClient,
};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// Injection options
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectOptions {
    /// Expose the raw client handle through [`ArtifactClient::raw_client`]
    pub with_ref: bool,
}

/// Artifact capability a wrapper infers against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capability {
    Token,
    Source,
    PaymentMethod,
}

impl Capability {
    fn label(self) -> &'static str {
        match self {
            Capability::Token => "token",
            Capability::Source => "source",
            Capability::PaymentMethod => "payment_method",
        }
    }

    fn implied(self, entry: &RegistrationEntry) -> Option<&str> {
        match self {
            Capability::Token => entry.implied_token_type.as_deref(),
            Capability::Source => entry.implied_source_type.as_deref(),
            Capability::PaymentMethod => entry.implied_payment_method_type.as_deref(),
        }
    }
}

/// Subscribes to the client scope and materializes an [`ArtifactClient`]
/// once the handle resolves
pub struct Injector {
    props: Arc<Mutex<Option<ArtifactClient>>>,
}

impl Injector {
    pub fn new(scope: &Scope, options: InjectOptions) -> ElementsResult<Self> {
        let Some(registry) = scope.registry() else {
            return Err(ElementsError::Scope {
                component: "Injector",
                required: "WidgetRegistry",
            });
        };

        let props: Arc<Mutex<Option<ArtifactClient>>> = Arc::new(Mutex::new(None));
        let sink = props.clone();
        let registry = registry.clone();
        scope.client().on_ready(move |client| {
            *lock(&sink) = Some(ArtifactClient {
                client,
                registry,
                with_ref: options.with_ref,
            });
        });
        Ok(Self { props })
    }

    /// The inferring client, absent until the scope's client resolves
    pub fn artifact_client(&self) -> Option<ArtifactClient> {
        lock(&self.props).clone()
    }
}

/// Client wrapper whose artifact operations infer their target widget from
/// the registry at call time
#[derive(Clone)]
pub struct ArtifactClient {
    client: WidgetClient,
    registry: WidgetRegistry,
    with_ref: bool,
}

impl ArtifactClient {
    /// Escape hatch to the unwrapped client, opted into at injection time
    pub fn raw_client(&self) -> Option<WidgetClient> {
        self.with_ref.then(|| self.client.clone())
    }

    /// Create a token. Accepts a widget reference (forwarded untouched), or
    /// an options object whose optional `type` narrows inference. Tokens
    /// always need a widget; zero matches is an error.
    #[instrument(skip_all)]
    pub fn create_token(&self, options: Value) -> ElementsResult<SdkCall> {
        if is_widget_reference(&options) {
            return Ok(self.dispatch_token(CallTarget::Reference(options), empty_object()));
        }

        let mut map = require_object("createToken", options)?;
        let requested = peek_type("createToken", &map)?;
        map.remove("type");

        let entries = self.registry.list_registered();
        match infer_entry(&entries, Capability::Token, requested.as_deref())? {
            Some(entry) => Ok(self.dispatch_token(
                CallTarget::Widget(entry.widget.clone()),
                Value::Object(map),
            )),
            None => Err(ElementsError::NoInferrableTarget {
                capability: "token",
                requested: requested.unwrap_or_else(|| "auto".to_string()),
            }),
        }
    }

    /// Create a source. Accepts a widget reference, or an options object
    /// whose optional `type` narrows inference. With zero matches the full
    /// options are forwarded widget-less — the caller may be sourcing from
    /// an existing token or raw data.
    #[instrument(skip_all)]
    pub fn create_source(&self, options: Value) -> ElementsResult<SdkCall> {
        if is_widget_reference(&options) {
            return Ok(self.dispatch_source(CallTarget::Reference(options), empty_object()));
        }

        let map = require_object("createSource", options)?;
        let requested = peek_type("createSource", &map)?;

        let entries = self.registry.list_registered();
        match infer_entry(&entries, Capability::Source, requested.as_deref())? {
            Some(entry) => {
                let mut rest = map;
                rest.remove("type");
                Ok(self.dispatch_source(
                    CallTarget::Widget(entry.widget.clone()),
                    Value::Object(rest),
                ))
            }
            None => {
                debug!("no widget matched for source creation; forwarding raw options");
                Ok(self.dispatch_source(CallTarget::None, Value::Object(map)))
            }
        }
    }

    /// Create a payment method from `{"type": ..., <type>: <widget ref or
    /// data>, ...}`. An embedded widget reference wins; otherwise inference
    /// runs against the registry. With an explicit type and zero matches the
    /// data is forwarded widget-less; without a type there is nothing to
    /// forward, so zero matches is an error.
    #[instrument(skip_all)]
    pub fn create_payment_method(&self, options: Value) -> ElementsResult<SdkCall> {
        let mut map = require_object("createPaymentMethod", options)?;
        let requested = peek_type("createPaymentMethod", &map)?;
        map.remove("type");

        if let Some(method_type) = &requested {
            let embedded = map
                .get(method_type.as_str())
                .is_some_and(is_widget_reference);
            if embedded {
                let reference = map
                    .remove(method_type.as_str())
                    .unwrap_or(Value::Null);
                return Ok(self.dispatch_payment_method(
                    method_type.clone(),
                    CallTarget::Reference(reference),
                    Value::Object(map),
                ));
            }
        }

        let entries = self.registry.list_registered();
        match infer_entry(&entries, Capability::PaymentMethod, requested.as_deref())? {
            Some(entry) => {
                let method_type = requested
                    .or_else(|| entry.implied_payment_method_type.clone())
                    .unwrap_or_else(|| "auto".to_string());
                Ok(self.dispatch_payment_method(
                    method_type,
                    CallTarget::Widget(entry.widget.clone()),
                    Value::Object(map),
                ))
            }
            None => match requested {
                Some(method_type) => {
                    debug!("no widget matched for payment method; forwarding raw data");
                    Ok(self.dispatch_payment_method(
                        method_type,
                        CallTarget::None,
                        Value::Object(map),
                    ))
                }
                None => Err(ElementsError::NoInferrableTarget {
                    capability: "payment_method",
                    requested: "auto".to_string(),
                }),
            },
        }
    }

    /// Confirm a payment intent, inferring the card widget when the data does
    /// not carry a payment-method reference of its own
    pub fn confirm_card_payment(&self, client_secret: &str, data: Value) -> ElementsResult<SdkCall> {
        self.confirm(Confirmation::Payment, client_secret, data)
    }

    /// Confirm a setup intent; same target resolution as
    /// [`ArtifactClient::confirm_card_payment`]
    pub fn confirm_card_setup(&self, client_secret: &str, data: Value) -> ElementsResult<SdkCall> {
        self.confirm(Confirmation::Setup, client_secret, data)
    }

    #[instrument(skip_all, fields(kind = confirmation.call()))]
    fn confirm(
        &self,
        confirmation: Confirmation,
        client_secret: &str,
        data: Value,
    ) -> ElementsResult<SdkCall> {
        let mut map = require_object(confirmation.call(), data)?;

        let target = if let Some(reference) = extract_payment_method_reference(&mut map) {
            CallTarget::Reference(reference)
        } else {
            let entries = self.registry.list_registered();
            match infer_entry(&entries, Capability::PaymentMethod, Some("card"))? {
                Some(entry) => CallTarget::Widget(entry.widget.clone()),
                None => {
                    debug!("no card widget mounted; confirming with caller data only");
                    CallTarget::None
                }
            }
        };

        let client = self.client.clone();
        let secret = client_secret.to_string();
        let data = Value::Object(map);
        Ok(match confirmation {
            Confirmation::Payment => Box::pin(async move {
                client.confirm_card_payment(&secret, target, data).await
            }),
            Confirmation::Setup => Box::pin(async move {
                client.confirm_card_setup(&secret, target, data).await
            }),
        })
    }

    fn dispatch_token(&self, target: CallTarget, options: Value) -> SdkCall {
        let client = self.client.clone();
        Box::pin(async move { client.create_token(target, options).await })
    }

    fn dispatch_source(&self, target: CallTarget, options: Value) -> SdkCall {
        let client = self.client.clone();
        Box::pin(async move { client.create_source(target, options).await })
    }

    fn dispatch_payment_method(
        &self,
        method_type: String,
        target: CallTarget,
        data: Value,
    ) -> SdkCall {
        let client = self.client.clone();
        Box::pin(async move {
            client
                .create_payment_method(&method_type, target, data)
                .await
        })
    }
}

#[derive(Clone, Copy)]
enum Confirmation {
    Payment,
    Setup,
}

impl Confirmation {
    fn call(self) -> &'static str {
        match self {
            Confirmation::Payment => "confirmCardPayment",
            Confirmation::Setup => "confirmCardSetup",
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize a caller's options argument: absent means empty, anything other
/// than an object is malformed
fn require_object(call: &'static str, options: Value) -> ElementsResult<Map<String, Value>> {
    match options {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(ElementsError::InvalidOptions {
            call,
            got: json_kind(&other),
        }),
    }
}

/// Read the `type` discriminator without consuming it
fn peek_type(call: &'static str, map: &Map<String, Value>) -> ElementsResult<Option<String>> {
    match map.get("type") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(requested)) => Ok(Some(requested.clone())),
        Some(_) => Err(ElementsError::InvalidTypeValue { call }),
    }
}

/// Resolve the single registered widget matching the capability, if any.
/// Several matches are always ambiguous, typed request or not.
fn infer_entry<'a>(
    entries: &'a [RegistrationEntry],
    capability: Capability,
    requested: Option<&str>,
) -> ElementsResult<Option<&'a RegistrationEntry>> {
    let matching: Vec<&RegistrationEntry> = entries
        .iter()
        .filter(|entry| match (capability.implied(entry), requested) {
            (Some(implied), Some(requested)) => implied == requested,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .collect();

    match matching.len() {
        0 => Ok(None),
        1 => Ok(Some(matching[0])),
        count => Err(ElementsError::AmbiguousInference {
            capability: capability.label(),
            requested: requested.unwrap_or("auto").to_string(),
            count,
        }),
    }
}

/// Pull an embedded widget reference out of confirmation data, either at
/// `payment_method` directly or nested at `payment_method.card`
fn extract_payment_method_reference(map: &mut Map<String, Value>) -> Option<Value> {
    match map.get("payment_method") {
        Some(value) if is_widget_reference(value) => map.remove("payment_method"),
        Some(Value::Object(method)) => {
            if method.get("card").is_some_and(is_widget_reference) {
                let Some(Value::Object(mut method)) = map.remove("payment_method") else {
                    return None;
                };
                let reference = method.remove("card");
                if !method.is_empty() {
                    map.insert("payment_method".to_string(), Value::Object(method));
                }
                reference
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ClientScope, ReadySignal};
    use crate::widget::{Widget, WidgetConfig};
    use elements_core::{DomAnchor, FactoryOptions};
    use elements_mock::{MockClient, RecordedTarget};
    use serde_json::json;

    fn registry_scope() -> (Scope, Arc<MockClient>) {
        let (client, mock) = MockClient::handle("pk_test_inject");
        let scope = Scope {
            client: ClientScope::Sync(client),
            registry: None,
        };
        let registry = WidgetRegistry::new(&scope, FactoryOptions::new());
        (registry.scope(), mock)
    }

    fn client_in(scope: &Scope) -> ArtifactClient {
        Injector::new(scope, InjectOptions::default())
            .unwrap()
            .artifact_client()
            .unwrap()
    }

    fn mount_card(scope: &Scope) -> Widget {
        let widget = Widget::card(scope).unwrap();
        widget
            .mount(DomAnchor::new("card"), WidgetConfig::default())
            .unwrap();
        widget
    }

    #[test]
    fn test_requires_registry_scope() {
        let (client, _mock) = MockClient::handle("pk_test_inject");
        let scope = Scope {
            client: ClientScope::Sync(client),
            registry: None,
        };
        let err = Injector::new(&scope, InjectOptions::default()).err().expect("expected error");
        assert!(matches!(
            err,
            ElementsError::Scope {
                component: "Injector",
                ..
            }
        ));
    }

    #[test]
    fn test_client_absent_until_scope_resolves() {
        let signal = ReadySignal::new();
        let scope = Scope {
            client: ClientScope::Async(signal.clone()),
            registry: None,
        };
        let registry = WidgetRegistry::new(&scope, FactoryOptions::new());
        let injector = Injector::new(&registry.scope(), InjectOptions::default()).unwrap();
        assert!(injector.artifact_client().is_none());

        let (client, _mock) = MockClient::handle("pk_test_inject");
        signal.resolve(client);
        assert!(injector.artifact_client().is_some());
    }

    #[test]
    fn test_raw_client_gated_by_with_ref() {
        let (scope, _mock) = registry_scope();
        assert!(client_in(&scope).raw_client().is_none());

        let with_ref = Injector::new(&scope, InjectOptions { with_ref: true })
            .unwrap()
            .artifact_client()
            .unwrap();
        assert!(with_ref.raw_client().is_some());
    }

    #[test]
    fn test_malformed_options_fail_synchronously() {
        let (scope, mock) = registry_scope();
        let client = client_in(&scope);

        assert!(matches!(
            client.create_token(json!("card")).err().expect("expected error"),
            ElementsError::InvalidOptions {
                call: "createToken",
                got: "string"
            }
        ));
        assert!(matches!(
            client.create_source(json!([1, 2])).err().expect("expected error"),
            ElementsError::InvalidOptions {
                call: "createSource",
                got: "array"
            }
        ));
        assert!(matches!(
            client.create_token(json!({"type": 7})).err().expect("expected error"),
            ElementsError::InvalidTypeValue { call: "createToken" }
        ));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_card_widget_is_inferred_for_tokens() {
        let (scope, mock) = registry_scope();
        let _card = mount_card(&scope);
        let client = client_in(&scope);

        let payload = client.create_token(Value::Null).unwrap().await;
        assert_eq!(payload["token"]["id"], json!("tok_mock"));

        let calls = mock.calls_for("create_token");
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0].target, RecordedTarget::Widget { .. }));
        assert_eq!(calls[0].options, json!({}));
    }

    #[tokio::test]
    async fn test_type_narrows_inference_and_is_stripped() {
        let (scope, mock) = registry_scope();
        let _card = mount_card(&scope);
        let iban = Widget::iban(&scope).unwrap();
        iban.mount(DomAnchor::new("iban"), WidgetConfig::default())
            .unwrap();
        let client = client_in(&scope);

        client
            .create_token(json!({"type": "bank_account", "currency": "eur"}))
            .unwrap()
            .await;

        let calls = mock.calls_for("create_token");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].target,
            RecordedTarget::Widget {
                frame_id: "frame_1".to_string()
            }
        );
        assert_eq!(calls[0].options, json!({"currency": "eur"}));
    }

    #[test]
    fn test_token_with_no_target_fails() {
        let (scope, mock) = registry_scope();
        let client = client_in(&scope);

        // Empty registry, auto mode
        assert!(matches!(
            client.create_token(Value::Null).err().expect("expected error"),
            ElementsError::NoInferrableTarget {
                capability: "token",
                ..
            }
        ));

        // Explicit type with nothing matching
        let _card = mount_card(&scope);
        let err = client.create_token(json!({"type": "pii"})).err().expect("expected error");
        match err {
            ElementsError::NoInferrableTarget {
                capability,
                requested,
            } => {
                assert_eq!(capability, "token");
                assert_eq!(requested, "pii");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_multiple_matches_are_always_ambiguous() {
        let (scope, mock) = registry_scope();
        let _a = mount_card(&scope);
        let _b = mount_card(&scope);
        let client = client_in(&scope);

        let err = client.create_token(Value::Null).err().expect("expected error");
        assert!(matches!(
            err,
            ElementsError::AmbiguousInference {
                capability: "token",
                count: 2,
                ..
            }
        ));

        // A specified type does not rescue the ambiguity
        let err = client.create_token(json!({"type": "card"})).err().expect("expected error");
        assert!(err.is_inference());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_source_fallback_forwards_raw_options() {
        let (scope, mock) = registry_scope();
        let client = client_in(&scope);

        client
            .create_source(json!({"type": "card", "token": "tok_x"}))
            .unwrap()
            .await;

        let calls = mock.calls_for("create_source");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, RecordedTarget::None);
        assert_eq!(calls[0].options, json!({"type": "card", "token": "tok_x"}));
    }

    #[tokio::test]
    async fn test_source_inference_strips_type() {
        let (scope, mock) = registry_scope();
        let _card = mount_card(&scope);
        let client = client_in(&scope);

        client
            .create_source(json!({"type": "card", "owner": {"name": "N"}}))
            .unwrap()
            .await;

        let calls = mock.calls_for("create_source");
        assert!(matches!(calls[0].target, RecordedTarget::Widget { .. }));
        assert_eq!(calls[0].options, json!({"owner": {"name": "N"}}));
    }

    #[tokio::test]
    async fn test_widget_reference_passthrough() {
        let (scope, mock) = registry_scope();
        let card = mount_card(&scope);
        let reference = card.instance().unwrap().reference();
        let client = client_in(&scope);

        client.create_token(reference.clone()).unwrap().await;
        client.create_source(reference.clone()).unwrap().await;

        assert_eq!(
            mock.calls_for("create_token")[0].target,
            RecordedTarget::Reference(reference.clone())
        );
        assert_eq!(
            mock.calls_for("create_source")[0].target,
            RecordedTarget::Reference(reference)
        );
    }

    #[tokio::test]
    async fn test_payment_method_auto_uses_implied_type() {
        let (scope, mock) = registry_scope();
        let _card = mount_card(&scope);
        let client = client_in(&scope);

        client
            .create_payment_method(json!({"billing_details": {"name": "N"}}))
            .unwrap()
            .await;

        let calls = mock.calls_for("create_payment_method");
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0].target, RecordedTarget::Widget { .. }));
        assert_eq!(calls[0].detail, json!({"type": "card"}));
        assert_eq!(calls[0].options, json!({"billing_details": {"name": "N"}}));
    }

    #[tokio::test]
    async fn test_payment_method_embedded_reference_wins() {
        let (scope, mock) = registry_scope();
        let card = mount_card(&scope);
        let reference = card.instance().unwrap().reference();
        let client = client_in(&scope);

        client
            .create_payment_method(json!({
                "type": "card",
                "card": reference,
                "billing_details": {"name": "N"}
            }))
            .unwrap()
            .await;

        let calls = mock.calls_for("create_payment_method");
        assert!(matches!(calls[0].target, RecordedTarget::Reference(_)));
        assert_eq!(calls[0].detail, json!({"type": "card"}));
        assert_eq!(calls[0].options, json!({"billing_details": {"name": "N"}}));
    }

    #[tokio::test]
    async fn test_payment_method_fallback_requires_explicit_type() {
        let (scope, mock) = registry_scope();
        let client = client_in(&scope);

        // Explicit type with an empty registry falls back widget-less
        client
            .create_payment_method(json!({"type": "card", "card": {"token": "tok_x"}}))
            .unwrap()
            .await;
        let calls = mock.calls_for("create_payment_method");
        assert_eq!(calls[0].target, RecordedTarget::None);
        assert_eq!(calls[0].options, json!({"card": {"token": "tok_x"}}));

        // Auto mode with an empty registry has nothing to forward
        assert!(matches!(
            client.create_payment_method(Value::Null).err().expect("expected error"),
            ElementsError::NoInferrableTarget {
                capability: "payment_method",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_confirmations_infer_card_widget() {
        let (scope, mock) = registry_scope();
        let _card = mount_card(&scope);
        let client = client_in(&scope);

        let payload = client
            .confirm_card_payment("pi_secret", json!({"receipt_email": "a@b.c"}))
            .unwrap()
            .await;
        assert_eq!(payload["paymentIntent"]["status"], json!("succeeded"));

        client
            .confirm_card_setup("seti_secret", Value::Null)
            .unwrap()
            .await;

        let payment = &mock.calls_for("confirm_card_payment")[0];
        assert!(matches!(payment.target, RecordedTarget::Widget { .. }));
        assert_eq!(payment.options, json!({"receipt_email": "a@b.c"}));
        assert_eq!(payment.detail, json!({"client_secret": "pi_secret"}));

        let setup = &mock.calls_for("confirm_card_setup")[0];
        assert!(matches!(setup.target, RecordedTarget::Widget { .. }));
        assert_eq!(setup.detail, json!({"client_secret": "seti_secret"}));
    }

    #[tokio::test]
    async fn test_confirmation_extracts_embedded_reference() {
        let (scope, mock) = registry_scope();
        let card = mount_card(&scope);
        let reference = card.instance().unwrap().reference();
        let client = client_in(&scope);

        client
            .confirm_card_payment(
                "pi_secret",
                json!({
                    "payment_method": {
                        "card": reference,
                        "billing_details": {"name": "N"}
                    }
                }),
            )
            .unwrap()
            .await;

        let call = &mock.calls_for("confirm_card_payment")[0];
        assert!(matches!(call.target, RecordedTarget::Reference(_)));
        assert_eq!(
            call.options,
            json!({"payment_method": {"billing_details": {"name": "N"}}})
        );
    }

    #[tokio::test]
    async fn test_confirmation_without_card_widget_forwards_data() {
        let (scope, mock) = registry_scope();
        let client = client_in(&scope);

        client
            .confirm_card_payment("pi_secret", json!({"payment_method": "pm_saved"}))
            .unwrap()
            .await;

        let call = &mock.calls_for("confirm_card_payment")[0];
        assert_eq!(call.target, RecordedTarget::None);
        assert_eq!(call.options, json!({"payment_method": "pm_saved"}));
    }

    #[tokio::test]
    async fn test_sdk_error_payloads_pass_through() {
        let (scope, mock) = registry_scope();
        let _card = mount_card(&scope);
        let client = client_in(&scope);

        mock.queue_payload(json!({"error": {"code": "card_declined"}}));
        let payload = client.create_token(Value::Null).unwrap().await;
        assert_eq!(payload, json!({"error": {"code": "card_declined"}}));
    }
}
