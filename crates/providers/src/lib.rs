//! Model gateway and provider implementations for deskhand.
//!
//! [`ModelGateway`] is what the engine talks to: it resolves a role to a
//! concrete model once per run, enforces the per-call timeout, and handles
//! the emergency (degraded) mode. Underneath sits any
//! [`deskhand_core::Provider`]; [`OpenAiCompatProvider`] covers every
//! OpenAI-compatible endpoint and [`ScriptedProvider`] replays canned
//! responses for offline runs and tests.

pub mod gateway;
pub mod openai_compat;
pub mod scripted;

pub use gateway::{EmergencyMode, ModelGateway, ModelRole, ModelRouting, ModelSelection};
pub use openai_compat::OpenAiCompatProvider;
pub use scripted::{ScriptedProvider, text_response, tool_call, tool_call_response};
