//! Strongly-typed identifiers used across the domain.
//!
//! Store and product ids are short human-readable strings (`S1`, `P3FA2C1D0`)
//! rather than UUIDs, because shopkeepers type them into bills and CSV files.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a shop (the `Store_ID` of the point-of-sale).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

/// Identifier of a catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

const MAX_ID_LEN: usize = 50;

macro_rules! impl_string_id {
    ($t:ty, $name:literal, $prefix:literal) => {
        impl $t {
            /// Generate a fresh identifier: prefix + first UUIDv4 segment, upper-cased.
            pub fn generate() -> Self {
                let uuid = Uuid::new_v4().simple().to_string();
                Self(format!("{}{}", $prefix, uuid[..8].to_uppercase()))
            }

            /// Wrap an identifier, validating it is non-blank and fits the column.
            pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: empty", $name)));
                }
                if trimmed.len() > MAX_ID_LEN {
                    return Err(DomainError::invalid_id(format!(
                        "{}: longer than {} characters",
                        $name, MAX_ID_LEN
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_id!(StoreId, "StoreId", "S");
impl_string_id!(ProductId, "ProductId", "P");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_product_ids_have_prefix_and_fixed_length() {
        let id = ProductId::generate();
        assert!(id.as_str().starts_with('P'));
        assert_eq!(id.as_str().len(), 9);
        assert_eq!(id.as_str(), id.as_str().to_uppercase());
    }

    #[test]
    fn parse_trims_and_rejects_blank() {
        assert_eq!(StoreId::parse("  S1 ").unwrap().as_str(), "S1");
        assert!(matches!(StoreId::parse("   "), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn parse_rejects_overlong_ids() {
        let long = "P".repeat(MAX_ID_LEN + 1);
        assert!(ProductId::parse(long).is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id: StoreId = "S1".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"S1\"");
    }
}
