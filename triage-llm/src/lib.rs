//! # Triage LLM
//!
//! Language-model access layer for the triage gateway.
//!
//! Provides a uniform [`LlmBackend`] trait over OpenAI-compatible inference
//! servers, a scripted [`MockBackend`] for tests, and an [`LlmClient`]
//! facade that adds backend selection and bounded call timeouts.
//!
//! All clinical decision-making stays deterministic; language models only
//! assist with summarization, question drafting and free-text extraction,
//! and every call site degrades to a rule-based fallback when the model
//! is unavailable.

pub mod backend;
pub mod client;

pub use backend::{GenerateRequest, GenerateResponse, LlmBackend, LlmError, MockBackend, OpenAiBackend};
pub use client::{strip_json_fences, LlmClient};
