use itertools::Itertools;
use std::collections::BTreeMap;
use std::path::Path;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Head,
    Delete,
}

/// Per-request settings handed to the server together with the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    pub method: RequestMethod,
    pub headers: BTreeMap<String, String>,
}

impl RequestConfig {
    pub fn new(method: RequestMethod) -> Self {
        Self {
            method,
            headers: BTreeMap::new(),
        }
    }

    pub fn get() -> Self {
        Self::new(RequestMethod::Get)
    }

    pub fn post() -> Self {
        Self::new(RequestMethod::Post)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self::get()
    }
}

/// Ordered WMS key/value pairs. Keys are written as given, values are
/// percent-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WmsQuery {
    params: Vec<(String, String)>,
}

impl WmsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get_legend_graphic(project: &Path, layer: &str) -> Self {
        Self::new()
            .param("MAP", &project.to_string_lossy())
            .param("SERVICE", "WMS")
            .param("VERSION", "1.1.1")
            .param("REQUEST", "GetLegendGraphic")
            .param("LAYERS", layer)
            .param("FORMAT", "image/png")
    }

    pub fn to_query_string(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .join("&")
    }
}

/// Parsed query string, the way a server sees it: upper-cased keys and
/// decoded values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerParameters {
    params: BTreeMap<String, String>,
}

impl ServerParameters {
    pub fn parse(query: &str) -> Self {
        let params = query
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (key.to_uppercase(), decode_component(value))
            })
            .collect();
        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(&key.to_uppercase()).map(String::as_str)
    }

    /// Missing and empty values both fall back to `default`.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.get(key) {
            Some(value) if !value.is_empty() => value,
            _ => default,
        }
    }

    pub fn list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|value| value.split(',').filter(|v| !v.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

fn decode_component(value: &str) -> String {
    let value = value.replace('+', " ");
    match urlencoding::decode(&value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value,
    }
}
