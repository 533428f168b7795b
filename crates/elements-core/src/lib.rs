//! # elements-core
//!
//! SDK boundary and shared types for the elements binding layer.
//!
//! This crate provides:
//! - [`ClientHandle`], [`WidgetFactory`], [`WidgetInstance`], [`SdkRuntime`]
//!   traits describing the external payment SDK
//! - [`CallTarget`] and [`is_widget_reference`] for classifying the
//!   widget-or-data argument of artifact calls
//! - [`FactoryOptions`] and [`ImpliedCapability`] option bundles
//! - [`ElementsError`] for typed error handling
//!
//! The binding machinery itself (providers, registry, widgets, injection)
//! lives in the `elements-bind` crate.

pub mod error;
pub mod options;
pub mod sdk;
pub mod target;

// Re-exports for convenience
pub use error::{ElementsError, ElementsResult};
pub use options::{FactoryOptions, ImpliedCapability};
pub use sdk::{
    ClientHandle, DomAnchor, EventCallback, SdkCall, SdkPayload, SdkRuntime, WidgetClient,
    WidgetEvent, WidgetFactory, WidgetFactoryHandle, WidgetHandle, WidgetInstance,
};
pub use target::{is_widget_reference, CallTarget, COMPONENT_NAME_KEY, FRAME_ID_KEY};
