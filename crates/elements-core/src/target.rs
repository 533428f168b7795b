//! # Call Targets
//!
//! Classification of the widget-or-data argument an artifact-creation call
//! operates on. The external SDK accepts either a widget handle or raw data
//! in the same position; this module replaces ad hoc field probing with a
//! single predicate and a sum type.

use crate::sdk::WidgetHandle;
use serde_json::Value;
use std::fmt;

/// Key carrying the internal frame identifier in a serialized widget
/// reference
pub const FRAME_ID_KEY: &str = "_frame_id";

/// Key carrying the component-name marker in a serialized widget reference
pub const COMPONENT_NAME_KEY: &str = "_component_name";

/// Resolved target of an artifact-creation call
#[derive(Clone)]
pub enum CallTarget {
    /// A mounted widget resolved through the registry
    Widget(WidgetHandle),
    /// A serialized widget reference supplied by the caller, forwarded
    /// untouched without consulting the registry
    Reference(Value),
    /// Raw, non-widget data (a saved card, an existing artifact id)
    Data(Value),
    /// No target: the operation carries everything it needs
    None,
}

impl CallTarget {
    /// Classify a loose caller value: a recognizable widget reference becomes
    /// [`CallTarget::Reference`], anything else is raw data
    pub fn classify(value: Value) -> CallTarget {
        if is_widget_reference(&value) {
            CallTarget::Reference(value)
        } else {
            CallTarget::Data(value)
        }
    }

    pub fn is_widget(&self) -> bool {
        matches!(self, CallTarget::Widget(_) | CallTarget::Reference(_))
    }
}

impl fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallTarget::Widget(widget) => f
                .debug_tuple("Widget")
                .field(&widget.reference())
                .finish(),
            CallTarget::Reference(value) => f.debug_tuple("Reference").field(value).finish(),
            CallTarget::Data(value) => f.debug_tuple("Data").field(value).finish(),
            CallTarget::None => write!(f, "None"),
        }
    }
}

/// Structural check for a serialized widget reference: an object carrying a
/// string frame identifier and a string component-name marker. Deliberately
/// not a type-name check — the reference is an opaque external value.
pub fn is_widget_reference(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.get(FRAME_ID_KEY).is_some_and(Value::is_string)
            && obj.get(COMPONENT_NAME_KEY).is_some_and(Value::is_string)
    })
}
