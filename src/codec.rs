//! Codec Module
//!
//! Converts typed IDs and values to and from the text stored in slots.
//!
//! The store never looks at native values; each table is given one codec
//! for its IDs and one for its values. Encoded text must not contain the
//! slot reserved bytes (`|`, newline, and `=` for IDs); the store rejects
//! such output with an encode error.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error returned by a codec
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Two-way conversion between `T` and its slot text
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<String, CodecError>;
    fn decode(&self, text: &str) -> Result<T, CodecError>;
}

impl<T, C: Codec<T> + ?Sized> Codec<T> for Box<C> {
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        (**self).encode(value)
    }

    fn decode(&self, text: &str) -> Result<T, CodecError> {
        (**self).decode(text)
    }
}

impl<T, C: Codec<T> + ?Sized> Codec<T> for Arc<C> {
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        (**self).encode(value)
    }

    fn decode(&self, text: &str) -> Result<T, CodecError> {
        (**self).decode(text)
    }
}

// =============================================================================
// Built-in Codecs
// =============================================================================

/// Identity codec for `String`
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn encode(&self, value: &String) -> Result<String, CodecError> {
        Ok(value.clone())
    }

    fn decode(&self, text: &str) -> Result<String, CodecError> {
        Ok(text.to_string())
    }
}

/// `Vec<f64>` as comma-separated fixed six-decimal text
///
/// Lossy: `1.23456789` is stored as `1.234568`.
#[derive(Debug, Clone, Copy, Default)]
pub struct F64VectorCodec;

impl Codec<Vec<f64>> for F64VectorCodec {
    fn encode(&self, value: &Vec<f64>) -> Result<String, CodecError> {
        if value.is_empty() {
            return Err(CodecError::new("cannot encode an empty vector"));
        }
        let parts: Vec<String> = value.iter().map(|x| format!("{:.6}", x)).collect();
        Ok(parts.join(","))
    }

    fn decode(&self, text: &str) -> Result<Vec<f64>, CodecError> {
        text.split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|e| CodecError::new(format!("invalid float '{}': {}", part, e)))
            })
            .collect()
    }
}

/// Codec built from a pair of plain functions
pub struct FnCodec<T> {
    encode: fn(&T) -> Result<String, CodecError>,
    decode: fn(&str) -> Result<T, CodecError>,
}

impl<T> FnCodec<T> {
    pub fn new(
        encode: fn(&T) -> Result<String, CodecError>,
        decode: fn(&str) -> Result<T, CodecError>,
    ) -> Self {
        Self { encode, decode }
    }
}

impl<T> fmt::Debug for FnCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCodec").finish_non_exhaustive()
    }
}

impl<T> Codec<T> for FnCodec<T> {
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        (self.encode)(value)
    }

    fn decode(&self, text: &str) -> Result<T, CodecError> {
        (self.decode)(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f64_vector_fixed_precision() {
        let codec = F64VectorCodec;

        let text = codec.encode(&vec![1.2, -3.4, 0.0]).unwrap();
        assert_eq!(text, "1.200000,-3.400000,0.000000");

        let lossy = codec.encode(&vec![1.23456789]).unwrap();
        assert_eq!(codec.decode(&lossy).unwrap(), vec![1.234568]);
    }

    #[test]
    fn test_f64_vector_rejects_garbage() {
        let codec = F64VectorCodec;

        assert!(codec.decode("1.0,abc").is_err());
        assert!(codec.encode(&Vec::new()).is_err());
    }

    #[test]
    fn test_fn_codec() {
        fn enc(v: &u32) -> Result<String, CodecError> {
            Ok(v.to_string())
        }
        fn dec(s: &str) -> Result<u32, CodecError> {
            s.parse().map_err(|_| CodecError::new("not a u32"))
        }

        let codec = FnCodec::new(enc, dec);
        assert_eq!(codec.encode(&42).unwrap(), "42");
        assert_eq!(codec.decode("42").unwrap(), 42);
        assert!(codec.decode("x").is_err());
    }
}
