use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CoordError;

/// JSON codec shared by an instance's typed accessors.
///
/// Wraps `serde_json` so encode and decode failures surface as
/// [`CoordError::Serialization`] instead of defaults; a malformed payload is
/// an error, not an empty value. Field naming, date formats, and
/// null-handling are `serde` derive concerns on the payload types themselves,
/// so the codec itself carries no runtime options.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a codec.
    pub fn new() -> Self {
        Self
    }

    /// Serialize `value` to its JSON string form.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CoordError> {
        serde_json::to_string(value).map_err(|e| CoordError::Serialization(e.to_string()))
    }

    /// Deserialize a JSON string into `T`.
    pub fn decode<T: DeserializeOwned>(&self, raw: &str) -> Result<T, CoordError> {
        serde_json::from_str(raw).map_err(|e| CoordError::Serialization(e.to_string()))
    }
}
