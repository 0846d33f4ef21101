// src/sanitize.rs

use crate::error::ParseError;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::warn;

/// Markdown code-fence markers, with or without a language tag.
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z]*\n?").expect("fence pattern is valid"));

/// Strip code fences and surrounding prose from the model's answer and
/// parse what remains as a JSON object.
pub fn sanitize(raw: &str) -> Result<Value, ParseError> {
    let unfenced = FENCE.replace_all(raw, "");
    let trimmed = unfenced.trim();

    let json_str = extract_json_object(trimmed)?;
    if json_str.len() != trimmed.len() {
        warn!(
            dropped = trimmed.len() - json_str.len(),
            "Model response had text around the JSON object"
        );
    }

    Ok(serde_json::from_str(json_str)?)
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text.
fn extract_json_object(s: &str) -> Result<&str, ParseError> {
    let start = s.find('{').ok_or(ParseError::NoObject)?;
    let end = s.rfind('}').ok_or(ParseError::NoObject)?;
    if end <= start {
        return Err(ParseError::NoObject);
    }
    Ok(&s[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BARE: &str = r#"{"invoice":{"serialNumber":"INV1"},"customer":{},"products":[{"name":"Widget"}]}"#;

    #[test]
    fn test_fenced_equals_bare() {
        let fenced = format!("```json\n{BARE}\n```");
        assert_eq!(sanitize(&fenced).unwrap(), sanitize(BARE).unwrap());

        let untagged = format!("```\n{BARE}\n```\n");
        assert_eq!(sanitize(&untagged).unwrap(), sanitize(BARE).unwrap());
    }

    #[test]
    fn test_prose_around_object() {
        let chatty = format!("Here is the extracted data:\n```json\n{BARE}\n```\nLet me know!");
        assert_eq!(sanitize(&chatty).unwrap(), sanitize(BARE).unwrap());
    }

    #[test]
    fn test_whitespace_trimmed() {
        let padded = format!("\n\n   {BARE}  \n");
        assert_eq!(sanitize(&padded).unwrap()["invoice"]["serialNumber"], "INV1");
    }

    #[test]
    fn test_no_object() {
        assert!(matches!(sanitize("I could not read this document."), Err(ParseError::NoObject)));
        assert!(matches!(sanitize("} backwards {"), Err(ParseError::NoObject)));
    }

    #[test]
    fn test_malformed_json() {
        let broken = r#"```json
{"invoice": {"serialNumber": "INV1",}, "products": [}
```"#;
        assert!(matches!(sanitize(broken), Err(ParseError::Json(_))));
    }
}
