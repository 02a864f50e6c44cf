//! JSON-to-record parsing.
//!
//! # Responsibility
//! - Map raw API objects to records inside a caller-supplied layer.
//!
//! # Invariants
//! - Required fields are `_id` and `name`, both non-blank strings. A payload
//!   missing either, or carrying a blank one, is treated as a broken server contract and panics rather than
//!   being skipped. Callers parsing untrusted input must check first.

use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod restaurant_parser;

pub use restaurant_parser::RestaurantParser;

/// One JSON object from an API payload.
pub type JsonObject = Map<String, Value>;

/// A required field was missing or had the wrong type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingField(&'static str),
    BlankField(&'static str),
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "required field `{field}` is missing"),
            Self::BlankField(field) => write!(f, "required field `{field}` is blank"),
            Self::WrongType { field, expected } => {
                write!(f, "required field `{field}` is not a {expected}")
            }
        }
    }
}

impl Error for ParseError {}

/// Maps API objects to one record type and back.
pub trait JsonParser {
    type Object;

    /// Builds a record from one object, or reports the contract violation.
    fn build_object(&self, object: &JsonObject) -> Result<Self::Object, ParseError>;

    /// Serializes a record back to JSON. Only needed for upload paths, which
    /// no entity implements yet.
    fn build_json_object(&self, _object: &Self::Object) -> JsonObject {
        JsonObject::new()
    }
}

/// Reads a required string field; whitespace-only values count as blank.
pub fn required_str<'a>(object: &'a JsonObject, field: &'static str) -> Result<&'a str, ParseError> {
    match object.get(field) {
        None => Err(ParseError::MissingField(field)),
        Some(Value::String(value)) if value.trim().is_empty() => {
            Err(ParseError::BlankField(field))
        }
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(_) => Err(ParseError::WrongType {
            field,
            expected: "string",
        }),
    }
}
