pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{encode_data_url, mime_from_filename, normalize_mime, sniff_mime};
pub use metrics::{Metrics, MetricsSnapshot};
