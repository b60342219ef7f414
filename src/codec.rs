//! JSON at the HTTP boundary.
//!
//! Decoding is strict: bounded body size, exactly one JSON value, no unknown
//! keys. Encoding wraps every payload in a single-key envelope such as
//! `{"movie": {...}}`.

use axum::{
    body::Body,
    extract::{FromRef, FromRequest, Request},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::{
    Deserializer, Serialize, Serializer,
    de::{DeserializeOwned, IgnoredAny, Visitor},
    ser::SerializeMap,
};
use serde_json::error::Category;
use serde_path_to_error::Segment;
use thiserror::Error;

use crate::error::AppError;

/// Default request body limit: 1 MiB.
pub const MAX_BODY_BYTES: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("body must not be larger than {limit} bytes")]
    TooLarge { limit: usize },
    #[error("body contains badly-formed JSON")]
    BadlyFormed,
    #[error("body contains incorrect JSON type for field {field:?}")]
    IncorrectType { field: String },
    #[error("body contains incorrect JSON type (at character {offset})")]
    IncorrectTypeAt { offset: usize },
    #[error("body must not be empty")]
    Empty,
    #[error("body contains unknown key {key:?}")]
    UnknownKey { key: String },
    #[error("body contains duplicate key {key:?}")]
    DuplicateKey { key: String },
    #[error("body must only contain a single JSON value")]
    MultipleValues,
    #[error("body could not be read")]
    Unreadable,
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
#[error("failed to encode response body: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Maximum accepted request body, resolved from router state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimit(pub usize);

impl Default for BodyLimit {
    fn default() -> Self {
        Self(MAX_BODY_BYTES)
    }
}

/// Reads at most `limit` bytes from `body` and decodes them with
/// [`decode_json`].
pub async fn read_json<T>(body: Body, limit: usize) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                DecodeError::TooLarge { limit }
            } else {
                DecodeError::Unreadable
            }
        })?
        .to_bytes();

    decode_json(&bytes)
}

/// Decodes exactly one JSON value from `bytes`.
pub fn decode_json<T>(bytes: &[u8]) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(ObjectRoot(&mut deserializer))
        .map_err(|err| classify(bytes, err))?;

    // Anything decodable after the first value, even garbage, means the body
    // held more than one value. Only a clean end of input passes.
    if deserializer.into_iter::<IgnoredAny>().next().is_some() {
        return Err(DecodeError::MultipleValues);
    }

    Ok(value)
}

fn classify(body: &[u8], err: serde_path_to_error::Error<serde_json::Error>) -> DecodeError {
    let field = top_level_key(err.path());
    let inner = err.into_inner();

    match inner.classify() {
        Category::Io => DecodeError::Unreadable,
        Category::Syntax | Category::Eof => DecodeError::BadlyFormed,
        Category::Data => {
            let message = bare_message(&inner);

            if let Some(key) = quoted_after(&message, "unknown field `") {
                return DecodeError::UnknownKey {
                    key: key.to_string(),
                };
            }

            if let Some(key) = quoted_after(&message, "duplicate field `") {
                return DecodeError::DuplicateKey {
                    key: key.to_string(),
                };
            }

            if is_type_mismatch(&message) {
                return match field {
                    Some(field) => DecodeError::IncorrectType { field },
                    None => DecodeError::IncorrectTypeAt {
                        offset: value_offset(body),
                    },
                };
            }

            DecodeError::Invalid(message)
        }
    }
}

/// Errors inside a nested value are reported against the body key that
/// holds it, so `genres[0]` is reported as `genres`.
fn top_level_key(path: &serde_path_to_error::Path) -> Option<String> {
    match path.iter().next()? {
        Segment::Map { key } => Some(key.clone()),
        _ => None,
    }
}

/// serde_json appends the position to every message; strip it.
fn bare_message(err: &serde_json::Error) -> String {
    let message = err.to_string();
    let position = format!(" at line {} column {}", err.line(), err.column());

    if let Some(bare) = message.strip_suffix(position.as_str()) {
        return bare.to_string();
    }
    message
}

fn quoted_after<'a>(message: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = message.strip_prefix(prefix)?;
    rest.split_once('`').map(|(key, _)| key)
}

fn is_type_mismatch(message: &str) -> bool {
    ["invalid type", "invalid value", "invalid length"]
        .iter()
        .any(|prefix| message.starts_with(prefix))
}

/// 1-based position of the first byte of the top-level value.
fn value_offset(body: &[u8]) -> usize {
    body.iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |index| index + 1)
}

/// Decodes struct targets from JSON objects only. A derived `Deserialize`
/// also accepts an array for a struct and fills the fields by position.
struct ObjectRoot<D>(D);

macro_rules! forward_to_inner {
    ($($method:ident)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, Self::Error>
            where
                V: Visitor<'de>,
            {
                self.0.$method(visitor)
            }
        )*
    };
}

impl<'de, D> Deserializer<'de> for ObjectRoot<D>
where
    D: Deserializer<'de>,
{
    type Error = D::Error;

    forward_to_inner! {
        deserialize_any deserialize_bool
        deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64 deserialize_i128
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_u128
        deserialize_f32 deserialize_f64 deserialize_char deserialize_str deserialize_string
        deserialize_bytes deserialize_byte_buf deserialize_option deserialize_unit
        deserialize_seq deserialize_map deserialize_identifier deserialize_ignored_any
    }

    fn deserialize_unit_struct<V>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_unit_struct(name, visitor)
    }

    fn deserialize_newtype_struct<V>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_newtype_struct(name, visitor)
    }

    fn deserialize_tuple<V>(self, len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_tuple(len, visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_tuple_struct(name, len, visitor)
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_map(visitor)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.0.deserialize_enum(name, variants, visitor)
    }

    fn is_human_readable(&self) -> bool {
        self.0.is_human_readable()
    }
}

/// Body extractor applying [`read_json`] with the state's [`BodyLimit`].
#[derive(Debug, Clone)]
pub struct StrictJson<T>(pub T);

impl<S, T> FromRequest<S> for StrictJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
    BodyLimit: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let BodyLimit(limit) = BodyLimit::from_ref(state);
        let value = read_json(req.into_body(), limit).await?;
        Ok(Self(value))
    }
}

/// A payload namespaced under one label.
#[derive(Debug)]
pub struct Envelope<'a, T: ?Sized> {
    label: &'a str,
    payload: &'a T,
}

impl<'a, T: ?Sized> Envelope<'a, T> {
    pub fn new(label: &'a str, payload: &'a T) -> Self {
        Self { label, payload }
    }
}

impl<T> Serialize for Envelope<'_, T>
where
    T: Serialize + ?Sized,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.label, self.payload)?;
        map.end()
    }
}

/// Serialises `envelope` and only then assembles the response, so a payload
/// that fails to encode never yields a partial one.
pub fn write_json<T>(
    status: StatusCode,
    envelope: &Envelope<'_, T>,
    headers: Option<HeaderMap>,
) -> Result<Response, EncodeError>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(envelope)?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let response_headers = response.headers_mut();
    if let Some(headers) = headers {
        response_headers.extend(headers);
    }
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    Ok(response)
}
