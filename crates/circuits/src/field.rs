//! Canonical decimal encoding for BN254 scalar field elements.
//!
//! Every field element that crosses a serialization boundary (local files,
//! snapshots, ledger payloads, HTTP bodies) is written as a base-10 string.
//! Values wider than a machine word must never pass through a float.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use num_bigint::BigUint;
use thiserror::Error;

/// Errors raised while encoding identity fields or decoding field elements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("field `{field}` is empty")]
    Empty { field: &'static str },
    #[error("field `{field}` must be a decimal numeral")]
    NonNumeric { field: &'static str },
    #[error("field `{field}` is {len} bytes, limit is {limit}")]
    Oversized {
        field: &'static str,
        len: usize,
        limit: usize,
    },
    #[error("field `{field}` does not fit the scalar field")]
    OutOfRange { field: &'static str },
}

/// The scalar field modulus as an arbitrary-precision integer.
pub fn modulus() -> BigUint {
    BigUint::from(Fr::MODULUS)
}

/// Convert a field element to its canonical decimal string.
pub fn fr_to_decimal(value: &Fr) -> String {
    let n: BigUint = (*value).into();
    n.to_str_radix(10)
}

/// Parse a canonical decimal string into a field element.
///
/// Rejects anything other than ASCII digits and values that are not already
/// reduced; silently wrapping modulo the field would hide corrupted input.
pub fn fr_from_decimal(field: &'static str, s: &str) -> Result<Fr, EncodingError> {
    let n = parse_decimal(field, s)?;
    if n >= modulus() {
        return Err(EncodingError::OutOfRange { field });
    }
    Ok(Fr::from(n))
}

pub(crate) fn parse_decimal(field: &'static str, s: &str) -> Result<BigUint, EncodingError> {
    if s.is_empty() {
        return Err(EncodingError::Empty { field });
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EncodingError::NonNumeric { field });
    }
    BigUint::parse_bytes(s.as_bytes(), 10).ok_or(EncodingError::NonNumeric { field })
}

/// Encode UTF-8 text as the big-endian integer of its bytes.
pub(crate) fn text_to_fr(field: &'static str, text: &str, limit: usize) -> Result<Fr, EncodingError> {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return Err(EncodingError::Empty { field });
    }
    if bytes.len() > limit {
        return Err(EncodingError::Oversized {
            field,
            len: bytes.len(),
            limit,
        });
    }
    Ok(Fr::from(BigUint::from_bytes_be(bytes)))
}

/// Serde adapter: `#[serde(with = "identity_circuits::field::decimal")]`.
pub mod decimal {
    use ark_bn254::Fr;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::fr_to_decimal(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fr, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::fr_from_decimal("value", &s).map_err(D::Error::custom)
    }
}

/// Serde adapter for `Vec<Fr>`.
pub mod decimal_vec {
    use ark_bn254::Fr;
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[Fr], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in values {
            seq.serialize_element(&super::fr_to_decimal(v))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Fr>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| super::fr_from_decimal("value", s).map_err(D::Error::custom))
            .collect()
    }
}

/// Serde adapter for `Option<Fr>`.
pub mod decimal_opt {
    use ark_bn254::Fr;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Fr>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&super::fr_to_decimal(v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Fr>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| super::fr_from_decimal("value", &s).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_decimal_roundtrip_wide_value() {
        // p - 1 is the widest canonical value
        let max = Fr::from(0u64) - Fr::from(1u64);
        let s = fr_to_decimal(&max);
        assert_eq!(s, (modulus() - 1u32).to_str_radix(10));
        assert_eq!(fr_from_decimal("x", &s).unwrap(), max);
    }

    #[test]
    fn test_zero_is_written_as_zero() {
        assert_eq!(fr_to_decimal(&Fr::from(0u64)), "0");
        assert_eq!(fr_from_decimal("x", "0").unwrap(), Fr::from(0u64));
    }

    #[test]
    fn test_rejects_unreduced_and_malformed() {
        let p = modulus().to_str_radix(10);
        assert_eq!(
            fr_from_decimal("root", &p),
            Err(EncodingError::OutOfRange { field: "root" })
        );
        assert_eq!(
            fr_from_decimal("root", "12a"),
            Err(EncodingError::NonNumeric { field: "root" })
        );
        assert_eq!(
            fr_from_decimal("root", "1_000"),
            Err(EncodingError::NonNumeric { field: "root" })
        );
        assert_eq!(fr_from_decimal("root", ""), Err(EncodingError::Empty { field: "root" }));
    }

    #[test]
    fn test_text_encoding_is_big_endian() {
        let v = text_to_fr("name", "AB", 31).unwrap();
        assert_eq!(v, Fr::from(0x4142u64));

        let long = "x".repeat(32);
        assert!(matches!(
            text_to_fr("name", &long, 31),
            Err(EncodingError::Oversized { len: 32, limit: 31, .. })
        ));
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper {
        #[serde(with = "decimal")]
        value: Fr,
        #[serde(with = "decimal_vec")]
        values: Vec<Fr>,
    }

    #[test]
    fn test_serde_writes_strings() {
        let w = Wrapper {
            value: Fr::from(u64::MAX) * Fr::from(u64::MAX),
            values: vec![Fr::from(7u64)],
        };
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"values\":[\"7\"]"));
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }
}
