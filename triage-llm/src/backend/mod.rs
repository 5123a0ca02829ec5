//! LLM backend implementations.

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockBackend;
pub use openai::OpenAiBackend;
pub use traits::{GenerateRequest, GenerateResponse, LlmBackend, LlmError};
