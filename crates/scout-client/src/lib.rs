pub mod browser;
pub mod ollama;

pub use browser::{ADVISORY_HEADERS, ChromiumSession, ChromiumSessionFactory};
pub use ollama::{OllamaClassifier, OllamaConfig};
