// Library exports for the SnapSort screenshot analysis service

pub mod core;
pub mod orchestration;
pub mod server;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{ConfigError, ParseError, PipelineError, ProviderError, ValidationError},
    types::{
        AnalysisResult, BatchRequest, BatchResponse, ExtractedProduct, Extraction, ImageItem,
        ItemOutcome, Submission, UploadedFile,
    },
};

pub use orchestration::{BatchOrchestrator, Validator};

pub use server::{build_router, AppState};

pub use services::{parse_extraction, VisionClient, VisionTransport};

pub use utils::Metrics;
