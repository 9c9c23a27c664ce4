//! LLM-backed analyst.

mod openai;

pub use openai::LlmAnalyst;
