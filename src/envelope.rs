//! Decoding of the `{"response": ...}` / `{"error": {...}}` body envelope.
//!
//! The API occasionally writes two JSON objects back to back with no separator,
//! typically an error followed by a response. Bodies are therefore read as a
//! stream of top-level values and inspected in document order.

use crate::error::ApiError;
use serde_json::Value;

/// The outcome carried by a response body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Envelope {
    /// A `response` chunk was found before any `error` chunk.
    Response(Value),
    /// An `error` chunk was found before any `response` chunk.
    Error(ApiError),
    /// No chunk carried either key.
    Empty,
}

/// Iterates over the top-level JSON values in `text`.
///
/// The first value is returned as-is, including a decode error. Decoding stops
/// silently at the first undecodable value after that.
pub(crate) fn json_chunks(
    text: &str,
) -> impl Iterator<Item = Result<Value, serde_json::Error>> + '_ {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .enumerate()
        .take_while(|(index, chunk)| *index == 0 || chunk.is_ok())
        .map(|(_, chunk)| chunk)
}

/// Finds the first chunk that decides the outcome of the call.
pub(crate) fn interpret(text: &str) -> Result<Envelope, serde_json::Error> {
    for chunk in json_chunks(text) {
        let Value::Object(mut object) = chunk? else {
            continue;
        };

        if let Some(response) = object.remove("response") {
            return Ok(Envelope::Response(response));
        }
        if let Some(error) = object.remove("error") {
            return Ok(Envelope::Error(ApiError::from_value(error)));
        }
    }

    Ok(Envelope::Empty)
}
