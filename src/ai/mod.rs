// AI module for book recommendations
//
// This module provides:
// - Request building (prompt text + response schema) over the catalog
// - Gemini client behind the TextGenerator capability trait
// - Response validation into typed recommendations
// - API key lifecycle via environment or OS keychain

pub mod system_prompt;
pub mod credentials;
pub mod context_builder;
pub mod gemini_client;
pub mod recommender;

// Re-export commonly used types
pub use context_builder::{CatalogMode, PromptSpec, RequestBuilder, ResponseSchema};
pub use credentials::{CredentialManager, KeySource};
pub use gemini_client::{GeminiClient, TextGenerator};
pub use recommender::{Recommend, RecommendationClient, RecommendationResult};
