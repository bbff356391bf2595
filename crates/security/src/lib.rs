//! Workspace sandboxing for deskhand.
//!
//! File and code skills may only touch paths inside one workspace root.
//! [`WorkspaceSandbox::resolve`] turns a model-supplied path into a checked
//! absolute path or refuses it.

pub mod path;

pub use path::{SandboxError, WorkspaceSandbox};
