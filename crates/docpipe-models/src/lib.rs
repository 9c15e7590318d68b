//! Built-in capability backends and the model catalog.
//!
//! The registry and stages treat models as opaque `ModelInstance`s; this
//! crate supplies the concrete ones that ship with docpipe and the name
//! resolution that turns a `load_model` request into an instance.

pub mod catalog;
pub mod detect;
pub mod preprocess;
pub mod rules;

pub use catalog::{ModelCatalog, UnknownModelPolicy};
pub use detect::BlockDetector;
pub use preprocess::DocumentCleaner;
pub use rules::{invoice_field_rules, RegexRuleModel};
