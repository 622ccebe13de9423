use serde::{Deserialize, Serialize};

use inventrack_core::{DomainError, DomainResult, StoreId};

/// Status given to newly registered shops.
pub const DEFAULT_SHOP_STATUS: &str = "Active";

/// A shop (point of sale) that owns inventory rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub store_id: StoreId,
    pub shop_name: String,
    pub business_verification_id: Option<String>,
    pub address: String,
    pub city: String,
    pub shop_phone: Option<String>,
    pub store_type: Option<String>,
    pub status: String,
    pub owner_name: String,
    pub owner_email: String,
}

/// Command: RegisterShop.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterShop {
    /// Caller-chosen store id; generated when absent.
    pub store_id: Option<StoreId>,
    pub shop_name: String,
    pub business_verification_id: Option<String>,
    pub address: String,
    pub city: String,
    pub shop_phone: Option<String>,
    pub store_type: Option<String>,
    pub owner_name: String,
    pub owner_email: String,
}

impl Shop {
    /// Validate a registration and build the new (active) shop.
    pub fn register(cmd: RegisterShop) -> DomainResult<Self> {
        let shop_name = required("shop_name", &cmd.shop_name)?;
        let address = required("address", &cmd.address)?;
        let city = required("city", &cmd.city)?;
        let owner_name = required("owner_name", &cmd.owner_name)?;
        let owner_email = required("owner_email", &cmd.owner_email)?;
        if !owner_email.contains('@') {
            return Err(DomainError::validation("owner_email must be an email address"));
        }

        Ok(Self {
            store_id: cmd.store_id.unwrap_or_else(StoreId::generate),
            shop_name,
            business_verification_id: optional(cmd.business_verification_id),
            address,
            city,
            shop_phone: optional(cmd.shop_phone),
            store_type: optional(cmd.store_type),
            status: DEFAULT_SHOP_STATUS.to_string(),
            owner_name,
            owner_email,
        })
    }
}

fn required(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_cmd() -> RegisterShop {
        RegisterShop {
            store_id: Some(StoreId::parse("S1").unwrap()),
            shop_name: "Corner Kirana".to_string(),
            business_verification_id: Some("  ".to_string()),
            address: "12 MG Road".to_string(),
            city: "Pune".to_string(),
            owner_name: "A. Shopkeeper".to_string(),
            owner_email: "owner@example.com".to_string(),
            ..RegisterShop::default()
        }
    }

    #[test]
    fn register_builds_active_shop_and_drops_blank_optionals() {
        let shop = Shop::register(register_cmd()).unwrap();
        assert_eq!(shop.store_id.as_str(), "S1");
        assert_eq!(shop.status, "Active");
        assert_eq!(shop.business_verification_id, None);
    }

    #[test]
    fn register_generates_store_id_when_absent() {
        let mut cmd = register_cmd();
        cmd.store_id = None;
        let shop = Shop::register(cmd).unwrap();
        assert!(shop.store_id.as_str().starts_with('S'));
    }

    #[test]
    fn register_rejects_missing_city() {
        let mut cmd = register_cmd();
        cmd.city = String::new();
        assert!(matches!(Shop::register(cmd), Err(DomainError::Validation(_))));
    }
}
