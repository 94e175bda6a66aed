//! Parsing and formatting of the `Signature` request header:
//! `keyId="<IRI>",headers="<space-separated>",signature="<base64>"`.

use apfed_error::{ApfedError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub key_id: String,
    pub headers: Vec<String>,
    pub signature: String,
}

impl SignatureHeader {
    pub fn to_header_value(&self) -> String {
        format!(
            r#"keyId="{}",headers="{}",signature="{}""#,
            self.key_id,
            self.headers.join(" "),
            self.signature
        )
    }

    /// Parses a comma-separated `key="value"` list, matching the loose
    /// format real fediverse servers emit (no `algorithm=` requirement,
    /// arbitrary field order).
    pub fn parse(raw: &str) -> Result<Self> {
        let mut key_id = None;
        let mut headers = None;
        let mut signature = None;

        for field in split_fields(raw) {
            let (name, value) = field
                .split_once('=')
                .ok_or_else(|| ApfedError::invalid_signature("malformed Signature field"))?;
            let value = value.trim().trim_matches('"');
            match name.trim() {
                "keyId" => key_id = Some(value.to_string()),
                "headers" => {
                    headers = Some(value.split_whitespace().map(str::to_string).collect())
                }
                "signature" => signature = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(SignatureHeader {
            key_id: key_id
                .ok_or_else(|| ApfedError::invalid_signature("Signature header missing keyId"))?,
            headers: headers.unwrap_or_default(),
            signature: signature.ok_or_else(|| {
                ApfedError::invalid_signature("Signature header missing signature")
            })?,
        })
    }
}

/// Splits on top-level commas, ignoring commas inside quoted values.
fn split_fields(raw: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        fields.push(current);
    }
    fields
}
