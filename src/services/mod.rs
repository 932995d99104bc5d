pub mod parser;
pub mod vision;

// Re-export commonly used services
pub use parser::parse_extraction;
pub use vision::{OpenAiTransport, VisionClient, VisionTransport};
