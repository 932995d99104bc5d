// Request, item and response types for the analysis pipeline

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One file as received from the multipart form, before validation
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Raw submission: every `files` field in form order
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub files: Vec<UploadedFile>,
}

/// Validated image, owned by exactly one item pipeline
#[derive(Debug, Clone)]
pub struct ImageItem {
    /// Position in the original submission, used to restore order
    pub index: usize,
    pub filename: String,
    pub bytes: Bytes,
    pub mime_type: String,
}

/// Validated batch of 1..=max_files items, in submission order
#[derive(Debug, Clone)]
pub struct BatchRequest {
    items: Vec<ImageItem>,
}

impl BatchRequest {
    /// Items must already be indexed 0..n in order
    pub(crate) fn new(items: Vec<ImageItem>) -> Self {
        debug_assert!(items.iter().enumerate().all(|(i, item)| item.index == i));
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ImageItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ImageItem> {
        self.items
    }
}

/// A product listing found in a screenshot. Every field is best effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedProduct {
    pub brand: Option<String>,
    pub product_name: String,
    pub price: Option<String>,
}

/// Parser output for one screenshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub screenshot_type: String,
    pub products: Vec<ExtractedProduct>,
}

/// Outcome of one item pipeline. Never carries both products and an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "AnalysisResult")]
pub enum ItemOutcome {
    Success {
        filename: String,
        screenshot_type: String,
        products: Vec<ExtractedProduct>,
    },
    Failure {
        filename: String,
        error: String,
    },
}

impl ItemOutcome {
    pub fn success(filename: impl Into<String>, extraction: Extraction) -> Self {
        Self::Success {
            filename: filename.into(),
            screenshot_type: extraction.screenshot_type,
            products: extraction.products,
        }
    }

    pub fn failure(filename: impl Into<String>, error: impl ToString) -> Self {
        Self::Failure {
            filename: filename.into(),
            error: error.to_string(),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Self::Success { filename, .. } | Self::Failure { filename, .. } => filename,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }
}

/// Wire shape of one result entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub filename: String,
    #[serde(rename = "type")]
    pub screenshot_type: String,
    pub products: Vec<ExtractedProduct>,
    pub error: Option<String>,
}

impl From<ItemOutcome> for AnalysisResult {
    fn from(outcome: ItemOutcome) -> Self {
        match outcome {
            ItemOutcome::Success {
                filename,
                screenshot_type,
                products,
            } => Self {
                filename,
                screenshot_type,
                products,
                error: None,
            },
            ItemOutcome::Failure { filename, error } => Self {
                filename,
                screenshot_type: "error".to_string(),
                products: Vec::new(),
                error: Some(error),
            },
        }
    }
}

/// Ordered results; `results[i]` belongs to request item `i`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResponse {
    pub results: Vec<ItemOutcome>,
}

impl BatchResponse {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_serializes_with_empty_products() {
        let outcome = ItemOutcome::failure("a.png", "boom");
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["filename"], "a.png");
        assert_eq!(json["type"], "error");
        assert_eq!(json["products"], serde_json::json!([]));
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn test_success_serializes_null_error() {
        let outcome = ItemOutcome::success(
            "b.jpg",
            Extraction {
                screenshot_type: "product_listing".into(),
                products: vec![ExtractedProduct {
                    brand: None,
                    product_name: "Linen Shirt".into(),
                    price: Some("$21.42".into()),
                }],
            },
        );
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["type"], "product_listing");
        assert!(json["error"].is_null());
        assert!(json["products"][0]["brand"].is_null());
        assert_eq!(json["products"][0]["product_name"], "Linen Shirt");
        assert_eq!(json["products"][0]["price"], "$21.42");
    }

    #[test]
    fn test_batch_response_counts() {
        let response = BatchResponse {
            results: vec![
                ItemOutcome::failure("a.png", "x"),
                ItemOutcome::success(
                    "b.png",
                    Extraction {
                        screenshot_type: "unknown".into(),
                        products: vec![],
                    },
                ),
            ],
        };
        assert_eq!(response.successful(), 1);
        assert_eq!(response.failed(), 1);
    }
}
