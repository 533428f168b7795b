//! # Option Bundles
//!
//! Typed option bags that cross the SDK boundary, plus the declared
//! capability bundle a widget can register with.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Options for creating a widget factory (the `elements()` call)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactoryOptions {
    /// Locale for widget UI text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Custom font definitions forwarded to the SDK
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fonts: Vec<Value>,
}

impl FactoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Builder: add a font definition
    pub fn with_font(mut self, font: Value) -> Self {
        self.fonts.push(font);
        self
    }

    /// Wire shape the SDK expects; unset fields are omitted entirely
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// Declared association between a widget and the payment-artifact types it
/// can help create. A widget registers with the enclosing registry only when
/// at least one field is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImpliedCapability {
    pub token_type: Option<String>,
    pub source_type: Option<String>,
    pub payment_method_type: Option<String>,
}

impl ImpliedCapability {
    /// A widget with no implied capability; it never registers
    pub fn none() -> Self {
        Self::default()
    }

    /// Builder: declare the token type this widget can tokenize
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// Builder: declare the source type this widget can produce
    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    /// Builder: declare the payment-method type this widget can produce
    pub fn with_payment_method_type(mut self, payment_method_type: impl Into<String>) -> Self {
        self.payment_method_type = Some(payment_method_type.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.token_type.is_none() && self.source_type.is_none() && self.payment_method_type.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_factory_options_omit_unset_fields() {
        assert_eq!(FactoryOptions::new().to_value(), json!({}));

        let options = FactoryOptions::new()
            .with_locale("de")
            .with_font(json!({"cssSrc": "https://fonts.example/inter.css"}));
        assert_eq!(
            options.to_value(),
            json!({
                "locale": "de",
                "fonts": [{"cssSrc": "https://fonts.example/inter.css"}]
            })
        );
    }

    #[test]
    fn test_capability_emptiness() {
        assert!(ImpliedCapability::none().is_empty());
        assert!(!ImpliedCapability::none().with_token_type("card").is_empty());
        assert!(!ImpliedCapability::none()
            .with_payment_method_type("sepa_debit")
            .is_empty());
    }
}
