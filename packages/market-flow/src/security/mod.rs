//! Credential handling.

pub mod credentials;

pub use credentials::{LlmCredentials, SecretString, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};
