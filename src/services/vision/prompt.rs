// Extraction instruction and response schema sent with every screenshot

use serde_json::{json, Value};

pub const SYSTEM_PROMPT: &str = "\
You are a vision model specialized in analyzing shopping app screenshots.

TASK:
1. Identify the general type of screenshot.
2. Extract all clothing products visible in the screenshot.
   Each product includes: brand, product_name, price.
3. Output JSON exactly following:
{
  \"type\": \"...\",
  \"extracted\": [
    { \"brand\": null, \"product_name\": \"...\", \"price\": \"$21.42\" }
  ]
}
Use null for a brand or price that is not visible. Use an empty list when no products are visible.";

pub const USER_PROMPT: &str = "Analyze this shopping screenshot.";

/// Strict structured-output format for the Responses API
pub fn extraction_format() -> Value {
    json!({
        "type": "json_schema",
        "name": "shopping_extraction",
        "strict": true,
        "schema": {
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "type": { "type": "string" },
                "extracted": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {
                            "brand": { "type": ["string", "null"] },
                            "product_name": { "type": "string" },
                            "price": { "type": ["string", "null"] }
                        },
                        "required": ["brand", "product_name", "price"]
                    }
                }
            },
            "required": ["type", "extracted"]
        }
    })
}
