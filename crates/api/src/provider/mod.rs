//! LLM gateway integration (OpenRouter-compatible chat completions)

pub mod client;
pub mod models;
pub mod reasoning;

pub use client::{ChatMessage, ProviderClient, ProviderError, StreamEvent};
pub use models::ModelMap;
pub use reasoning::{is_reasoning_model, split_reasoning, split_steps, REASONING_SYSTEM_PROMPT};
