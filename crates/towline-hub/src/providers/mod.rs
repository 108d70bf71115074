//! Completion backends.

pub mod openai;

pub use openai::OpenAiBackend;
