//! OpenAI-compatible API types

mod openai;

pub use openai::*;
