//! Request body parsing middleware.
//!
//! Two parsers are installed on every application before any other
//! middleware or router: [`JsonBodyParser`] and [`UrlEncodedBodyParser`]
//! (with nested-object syntax enabled). A parsed body is stored in
//! [`HttpRequest::parsed_body`]; requests with any other content type, or
//! with an empty body, pass through untouched.

use crate::logging::trace;
use crate::{Error, HttpAdapter, HttpRequest, HttpResponse, Middleware, Next};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Default body size limit (100 KiB)
pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024;

/// Default number of bracket segments an extended form key may nest
pub const DEFAULT_FORM_DEPTH: usize = 5;

/// Default maximum number of fields in a form body
pub const DEFAULT_PARAMETER_LIMIT: usize = 1000;

/// Register the JSON and extended URL-encoded parsers on an adapter
pub fn install_body_parsers(adapter: &HttpAdapter, limit: usize) {
    adapter.use_middleware(JsonBodyParser::new().limit(limit));
    adapter.use_middleware(UrlEncodedBodyParser::new().extended(true).limit(limit));
}

fn check_limit(req: &HttpRequest, limit: usize) -> Result<(), Error> {
    if req.body.len() > limit {
        return Err(Error::PayloadTooLarge(format!(
            "Request body exceeds maximum size of {} bytes",
            limit
        )));
    }
    Ok(())
}

fn media_type(req: &HttpRequest) -> Option<String> {
    req.header("content-type").map(|value| {
        value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    })
}

/// Parses `application/json` (and `*+json`) bodies
pub struct JsonBodyParser {
    limit: usize,
}

impl JsonBodyParser {
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn accepts(media_type: &str) -> bool {
        media_type == "application/json" || media_type.ends_with("+json")
    }
}

impl Default for JsonBodyParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for JsonBodyParser {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let matches = media_type(&req).is_some_and(|media| Self::accepts(&media));
        if matches && req.parsed_body.is_none() && !req.body.is_empty() {
            check_limit(&req, self.limit)?;
            let value: Value = serde_json::from_slice(&req.body)
                .map_err(|e| Error::BadRequest(format!("Invalid JSON body: {}", e)))?;
            trace!(bytes = req.body.len(), "Parsed JSON body");
            req.parsed_body = Some(value);
        }
        next(req).await
    }
}

/// Parses `application/x-www-form-urlencoded` bodies
///
/// With `extended` enabled, bracket keys build nested values:
/// `user[name]=ann&tags[]=a&tags[]=b` becomes
/// `{"user": {"name": "ann"}, "tags": ["a", "b"]}`.
///
/// Brackets past `depth` are kept as one literal segment, so
/// `a[b][c]` at depth 1 becomes `{"a": {"b": {"[c]": ...}}}`. A body with
/// more than `parameter_limit` fields is rejected with 413.
pub struct UrlEncodedBodyParser {
    extended: bool,
    limit: usize,
    depth: usize,
    parameter_limit: usize,
}

impl UrlEncodedBodyParser {
    pub fn new() -> Self {
        Self {
            extended: false,
            limit: DEFAULT_BODY_LIMIT,
            depth: DEFAULT_FORM_DEPTH,
            parameter_limit: DEFAULT_PARAMETER_LIMIT,
        }
    }

    pub fn extended(mut self, extended: bool) -> Self {
        self.extended = extended;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn parameter_limit(mut self, parameter_limit: usize) -> Self {
        self.parameter_limit = parameter_limit;
        self
    }

    /// Decode a URL-encoded body into a JSON value
    pub fn parse(&self, body: &[u8]) -> Result<Value, Error> {
        let fields = body
            .split(|byte| *byte == b'&')
            .filter(|field| !field.is_empty())
            .count();
        if fields > self.parameter_limit {
            return Err(Error::PayloadTooLarge(format!(
                "Form body has {} fields, limit is {}",
                fields, self.parameter_limit
            )));
        }

        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| Error::BadRequest(format!("Failed to parse form data: {}", e)))?;

        let mut root = Value::Object(Map::new());
        for (key, value) in pairs {
            let segments = if self.extended {
                parse_key(&key, self.depth)
            } else {
                vec![key]
            };
            insert_value(&mut root, &segments, value);
        }
        Ok(root)
    }
}

impl Default for UrlEncodedBodyParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for UrlEncodedBodyParser {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let matches =
            media_type(&req).is_some_and(|media| media == "application/x-www-form-urlencoded");
        if matches && req.parsed_body.is_none() && !req.body.is_empty() {
            check_limit(&req, self.limit)?;
            let value = self.parse(&req.body)?;
            trace!(bytes = req.body.len(), extended = self.extended, "Parsed form body");
            req.parsed_body = Some(value);
        }
        next(req).await
    }
}

/// Split `a[b][]` into `["a", "b", ""]`.
///
/// At most `depth` brackets are split; the remainder stays one literal
/// segment. Malformed brackets keep the whole key literal.
fn parse_key(key: &str, depth: usize) -> Vec<String> {
    let open = match key.find('[') {
        Some(open) if open > 0 && depth > 0 => open,
        _ => return vec![key.to_string()],
    };

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        if segments.len() > depth {
            segments.push(rest.to_string());
            return segments;
        }
        let Some(close) = stripped.find(']') else {
            return vec![key.to_string()];
        };
        segments.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }

    if !rest.is_empty() {
        return vec![key.to_string()];
    }
    segments
}

fn insert_value(target: &mut Value, segments: &[String], value: String) {
    let Some((head, tail)) = segments.split_first() else {
        return;
    };

    // `[]` appends to an array
    if head.is_empty() {
        if !target.is_array() {
            *target = Value::Array(Vec::new());
        }
        if let Value::Array(items) = target {
            if tail.is_empty() {
                items.push(Value::String(value));
            } else {
                let mut child = Value::Object(Map::new());
                insert_value(&mut child, tail, value);
                items.push(child);
            }
        }
        return;
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else {
        return;
    };

    if tail.is_empty() {
        match map.get_mut(head.as_str()) {
            None => {
                map.insert(head.clone(), Value::String(value));
            }
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, Value::String(value)]);
            }
        }
    } else {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        insert_value(child, tail, value);
    }
}
