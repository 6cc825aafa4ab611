use crate::error::{CheckError, Result};
use std::collections::BTreeMap;

pub const CONTENT_TYPE: &str = "Content-Type";

/// Response headers as returned by the embedded server: one `Name: value`
/// per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    headers: BTreeMap<String, String>,
}

impl HeaderMap {
    /// Every non-empty line must split on `:` into exactly a name and a
    /// value. A value that itself contains `:` is rejected.
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(blob).map_err(|_| CheckError::MalformedHeaders {
            line: String::from_utf8_lossy(blob).into_owned(),
        })?;

        let mut headers = BTreeMap::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() != 2 {
                return Err(CheckError::MalformedHeaders {
                    line: line.to_string(),
                });
            }
            headers.insert(parts[0].to_string(), parts[1].trim().to_string());
        }
        Ok(Self { headers })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
