pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{ConfigError, ParseError, PipelineError, ProviderError, ValidationError};
pub use types::{
    AnalysisResult, BatchRequest, BatchResponse, ExtractedProduct, Extraction, ImageItem,
    ItemOutcome, Submission, UploadedFile,
};
