//! Mealwise LLM provider infrastructure adapters.
//!
//! Implements the [`generation::ProviderAdapter`] trait for Anthropic's
//! Messages API, OpenAI-compatible Chat Completions endpoints and Google
//! Gemini. Additional providers are added as new adapters plus one
//! [`AdapterFactories::register`] call, without any change to the
//! `orchestrator` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response
//! parsing and failure classification live here. Adapters perform exactly one
//! call per invocation and never retry; the orchestrator sees only
//! [`generation::ProviderAdapter`].

pub mod anthropic;
pub mod factory;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod settings;

pub use anthropic::AnthropicAdapter;
pub use factory::{AdapterFactories, AdapterFactory};
pub use gemini::GeminiAdapter;
pub use openai::OpenAiCompatibleAdapter;
pub use settings::{AdapterConfigError, AdapterSettings, DEFAULT_REQUEST_TIMEOUT};
