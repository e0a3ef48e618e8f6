//! Core types and retry machinery for Scout: the browser page-fetch engine
//! and the model-server readiness guard, both generic over their external
//! collaborators via traits.

pub mod error;
pub mod fetch;
pub mod readiness;
pub mod testutil;
pub mod traits;

pub use error::AppError;
pub use fetch::{FetchOptions, PageFetcher};
pub use readiness::{ModelReadiness, ReadinessConfig};
pub use traits::{BrowserSession, Classifier, ModelServer, Pacer, SessionFactory, TokioPacer};
