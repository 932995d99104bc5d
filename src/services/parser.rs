// Result parser: model-generated text -> typed product extraction
//
// Strategies, first match wins:
// 1. whole text is JSON
// 2. JSON inside a Markdown code fence
// 3. first embedded JSON value surrounded by commentary
// 4. "Brand: / Product: / Price:" key-value lines

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::errors::{ParseError, ParseResult};
use crate::core::types::{ExtractedProduct, Extraction};

const UNKNOWN_TYPE: &str = "unknown";

/// Embedded JSON must start within this many bytes of the output. Every
/// `{` or `[` before that point is tried, however much commentary precedes it.
const MAX_SCAN_BYTES: usize = 64 * 1024;

const LIST_KEYS: &[&str] = &["extracted", "products", "items"];
const TYPE_KEYS: &[&str] = &["type", "screenshot_type", "screenshotType"];
const BRAND_KEYS: &[&str] = &["brand", "brand_name", "brandName"];
const NAME_KEYS: &[&str] = &["product_name", "productName", "name", "title"];
const PRICE_KEYS: &[&str] = &["price", "cost", "amount"];

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("valid regex"));

static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*•]\s*|\d+[.)]\s*)?\**(brand|product[ _]?name|product|name|price)\**\s*[:=]\s*(.+?)\s*$",
    )
    .expect("valid regex")
});

/// Parse one item's raw model output.
///
/// A recognisable payload without a product list yields zero products;
/// text with no structure at all is a `ParseError`.
pub fn parse_extraction(raw: &str) -> ParseResult<Extraction> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseError::EmptyOutput);
    }

    if let Some(extraction) = from_json_payload(text) {
        return Ok(extraction);
    }

    let products = parse_key_value_lines(text);
    if !products.is_empty() {
        debug!("Recovered {} products from key-value text", products.len());
        return Ok(Extraction {
            screenshot_type: UNKNOWN_TYPE.to_string(),
            products,
        });
    }

    Err(ParseError::NoStructuredContent)
}

fn from_json_payload(text: &str) -> Option<Extraction> {
    // A well-formed object with no known keys still counts as a payload,
    // but only when nothing more specific is found in the same strategy
    let mut bare_object = false;

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(extraction) = extraction_from_value(&value) {
            return Some(extraction);
        }
        bare_object |= value.is_object();
    }

    for captures in CODE_FENCE.captures_iter(text) {
        let body = captures.get(1).map_or("", |m| m.as_str()).trim();
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            if let Some(extraction) = extraction_from_value(&value) {
                return Some(extraction);
            }
            bare_object |= value.is_object();
        }
    }

    let candidates = text
        .char_indices()
        .take_while(|(start, _)| *start < MAX_SCAN_BYTES)
        .filter(|(_, c)| *c == '{' || *c == '[');

    for (start, _) in candidates {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            if let Some(extraction) = extraction_from_value(&value) {
                return Some(extraction);
            }
            bare_object |= value.is_object();
        }
    }

    bare_object.then(|| Extraction {
        screenshot_type: UNKNOWN_TYPE.to_string(),
        products: Vec::new(),
    })
}

fn extraction_from_value(value: &Value) -> Option<Extraction> {
    match value {
        Value::Array(items) => products_from_array(items).map(|products| Extraction {
            screenshot_type: UNKNOWN_TYPE.to_string(),
            products,
        }),
        Value::Object(map) => extraction_from_object(map),
        _ => None,
    }
}

fn extraction_from_object(map: &Map<String, Value>) -> Option<Extraction> {
    let declared_type = first_text(map, TYPE_KEYS);
    let list = LIST_KEYS.iter().find_map(|key| map.get(*key));

    let products = match list {
        Some(Value::Array(items)) => items.iter().filter_map(product_from_value).collect(),
        Some(single @ Value::Object(_)) => product_from_value(single).into_iter().collect(),
        Some(_) => Vec::new(),
        // A bare product object
        None => match product_from_object(map) {
            Some(product) => vec![product],
            None if declared_type.is_some() => Vec::new(),
            None => return None,
        },
    };

    Some(Extraction {
        screenshot_type: declared_type.unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
        products,
    })
}

/// `[]` is zero products; a non-empty array must contain at least one product
fn products_from_array(items: &[Value]) -> Option<Vec<ExtractedProduct>> {
    if items.is_empty() {
        return Some(Vec::new());
    }
    let products: Vec<_> = items.iter().filter_map(product_from_value).collect();
    if products.is_empty() {
        None
    } else {
        Some(products)
    }
}

fn product_from_value(value: &Value) -> Option<ExtractedProduct> {
    value.as_object().and_then(product_from_object)
}

fn product_from_object(map: &Map<String, Value>) -> Option<ExtractedProduct> {
    let brand = first_text(map, BRAND_KEYS);
    let product_name = first_text(map, NAME_KEYS);
    let price = first_text(map, PRICE_KEYS);

    if brand.is_none() && product_name.is_none() && price.is_none() {
        return None;
    }

    Some(ExtractedProduct {
        brand,
        product_name: product_name.unwrap_or_default(),
        price,
    })
}

fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Brand,
    Name,
    Price,
}

fn parse_key_value_lines(text: &str) -> Vec<ExtractedProduct> {
    let mut products = Vec::new();
    let mut current = PartialProduct::default();

    let segments = text
        .lines()
        .flat_map(|line| line.split(['|', ';', '\t']))
        .map(str::trim)
        .filter(|segment| !segment.is_empty());

    for segment in segments {
        let Some(captures) = KEY_VALUE.captures(segment) else {
            continue;
        };
        let key = captures[1].to_ascii_lowercase();
        let value = captures[2].trim_matches(|c: char| c == '*' || c == '"').trim().to_string();
        if value.is_empty() {
            continue;
        }

        let field = match key.as_str() {
            "brand" => Field::Brand,
            "price" => Field::Price,
            _ => Field::Name,
        };

        // A repeated field starts the next product
        if current.has(field) {
            products.extend(current.take());
        }
        current.set(field, value);
    }
    products.extend(current.take());

    products
}

#[derive(Default)]
struct PartialProduct {
    brand: Option<String>,
    name: Option<String>,
    price: Option<String>,
}

impl PartialProduct {
    fn has(&self, field: Field) -> bool {
        match field {
            Field::Brand => self.brand.is_some(),
            Field::Name => self.name.is_some(),
            Field::Price => self.price.is_some(),
        }
    }

    fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Brand => self.brand = Some(value),
            Field::Name => self.name = Some(value),
            Field::Price => self.price = Some(value),
        }
    }

    fn take(&mut self) -> Option<ExtractedProduct> {
        let partial = std::mem::take(self);
        if partial.brand.is_none() && partial.name.is_none() && partial.price.is_none() {
            return None;
        }
        Some(ExtractedProduct {
            brand: partial.brand,
            product_name: partial.name.unwrap_or_default(),
            price: partial.price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(brand: Option<&str>, name: &str, price: Option<&str>) -> ExtractedProduct {
        ExtractedProduct {
            brand: brand.map(str::to_string),
            product_name: name.to_string(),
            price: price.map(str::to_string),
        }
    }

    #[test]
    fn test_structured_output() {
        let raw = r#"{"type":"product_listing","extracted":[
            {"brand":"Uniqlo","product_name":"Linen Shirt","price":"$29.90"},
            {"brand":null,"product_name":"Denim Jacket","price":null}
        ]}"#;

        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.screenshot_type, "product_listing");
        assert_eq!(
            extraction.products,
            vec![
                product(Some("Uniqlo"), "Linen Shirt", Some("$29.90")),
                product(None, "Denim Jacket", None),
            ]
        );
    }

    #[test]
    fn test_empty_listing_is_not_an_error() {
        let extraction = parse_extraction(r#"{"type":"home_feed","extracted":[]}"#).unwrap();
        assert_eq!(extraction.screenshot_type, "home_feed");
        assert!(extraction.products.is_empty());
    }

    #[test]
    fn test_missing_list_is_zero_products() {
        let extraction = parse_extraction(r#"{"type":"checkout"}"#).unwrap();
        assert_eq!(extraction.screenshot_type, "checkout");
        assert!(extraction.products.is_empty());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert_eq!(
            parse_extraction("lorem ipsum dolor sit amet"),
            Err(ParseError::NoStructuredContent)
        );
        assert_eq!(parse_extraction("   \n"), Err(ParseError::EmptyOutput));
    }

    #[test]
    fn test_fenced_json_with_commentary() {
        let raw = "Sure! Here is what I found:\n```json\n{\"type\":\"cart\",\"products\":[{\"brand\":\"Zara\",\"name\":\"Knit Sweater\",\"price\":39.95}]}\n```\nLet me know if you need more.";

        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.screenshot_type, "cart");
        assert_eq!(
            extraction.products,
            vec![product(Some("Zara"), "Knit Sweater", Some("39.95"))]
        );
    }

    #[test]
    fn test_embedded_json_after_noise() {
        let raw = "Results [see below]: {\"type\":\"search\",\"extracted\":[{\"product_name\":\"Chinos\",\"price\":\"$40\"}]} -- end";

        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.screenshot_type, "search");
        assert_eq!(extraction.products, vec![product(None, "Chinos", Some("$40"))]);
    }

    #[test]
    fn test_top_level_array() {
        let raw = r#"[{"brand":"Nike","product_name":"Air Max 90"}, "stray", 42]"#;

        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.screenshot_type, "unknown");
        assert_eq!(extraction.products, vec![product(Some("Nike"), "Air Max 90", None)]);
    }

    #[test]
    fn test_skips_empty_entries() {
        let raw = r#"{"type":"feed","extracted":[{}, {"brand":"  "}, {"product_name":"Tee"}]}"#;

        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.products, vec![product(None, "Tee", None)]);
    }

    #[test]
    fn test_key_value_fallback() {
        let raw = "I could not produce JSON, but:\n\
                   1. Brand: Levi's\n   Product: 501 Jeans\n   Price: $69.50\n\
                   2. Brand: H&M | Product name: Cotton Tee | Price: $9.99";

        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(
            extraction.products,
            vec![
                product(Some("Levi's"), "501 Jeans", Some("$69.50")),
                product(Some("H&M"), "Cotton Tee", Some("$9.99")),
            ]
        );
    }

    #[test]
    fn test_bare_object_is_zero_products_with_or_without_commentary() {
        for raw in ["{}", "Result: {}", "```json\n{\"note\":\"nothing here\"}\n```"] {
            let extraction = parse_extraction(raw).unwrap();
            assert_eq!(extraction.screenshot_type, "unknown", "{}", raw);
            assert!(extraction.products.is_empty(), "{}", raw);
        }
    }

    #[test]
    fn test_product_payload_wins_over_earlier_bare_object() {
        let raw = r#"Context {"source":"app"} then {"type":"cart","extracted":[{"product_name":"Mug"}]}"#;

        let extraction = parse_extraction(raw).unwrap();
        assert_eq!(extraction.screenshot_type, "cart");
        assert_eq!(extraction.products, vec![product(None, "Mug", None)]);
    }

    #[test]
    fn test_long_bracketed_commentary_before_payload() {
        let mut raw = "[note] ".repeat(100);
        raw.push_str(r#"{"type":"search","extracted":[{"brand":"Muji","product_name":"Notebook"}]}"#);

        let extraction = parse_extraction(&raw).unwrap();
        assert_eq!(extraction.screenshot_type, "search");
        assert_eq!(extraction.products, vec![product(Some("Muji"), "Notebook", None)]);
    }

    #[test]
    fn test_array_of_scalars_is_not_product_data() {
        assert_eq!(
            parse_extraction("see figure [1] and [2]"),
            Err(ParseError::NoStructuredContent)
        );
    }
}
