use serde::{Deserialize, Serialize};

use inventrack_core::{DomainError, DomainResult, Money, ProductId, ValueObject};

/// Price band of a product.
///
/// `mrp` is the maximum retail price (ceiling), `msp` the minimum selling
/// price (floor). Sales are recorded at `msp`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    pub mrp: Money,
    pub msp: Money,
}

impl ValueObject for Pricing {}

impl Pricing {
    pub fn new(mrp: Money, msp: Money) -> DomainResult<Self> {
        let pricing = Self { mrp, msp };
        pricing.validate()?;
        Ok(pricing)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.mrp.is_negative() || self.msp.is_negative() {
            return Err(DomainError::validation("prices cannot be negative"));
        }
        if self.msp > self.mrp {
            return Err(DomainError::validation(format!(
                "msp ({}) cannot exceed mrp ({})",
                self.msp, self.mrp
            )));
        }
        Ok(())
    }
}

/// Catalog product (global across shops).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    category: String,
    pricing: Pricing,
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub pricing: Pricing,
}

/// Command: UpdateProduct. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub category: Option<String>,
    pub mrp: Option<Money>,
    pub msp: Option<Money>,
}

impl Product {
    pub fn create(cmd: CreateProduct) -> DomainResult<Self> {
        let name = required("product_name", &cmd.name)?;
        let category = required("category", &cmd.category)?;
        cmd.pricing.validate()?;

        Ok(Self {
            id: cmd.product_id,
            name,
            category,
            pricing: cmd.pricing,
        })
    }

    /// Rebuild a product from persisted columns (no validation: rows were
    /// validated on the way in).
    pub fn restore(id: ProductId, name: String, category: String, pricing: Pricing) -> Self {
        Self {
            id,
            name,
            category,
            pricing,
        }
    }

    /// Apply a partial update, returning the new state.
    ///
    /// Price rules are checked against the merged result, so lowering `mrp`
    /// below the current `msp` fails even when `msp` is not part of the patch.
    pub fn updated(&self, patch: &UpdateProduct) -> DomainResult<Self> {
        let name = match &patch.name {
            Some(n) => required("product_name", n)?,
            None => self.name.clone(),
        };
        let category = match &patch.category {
            Some(c) => required("category", c)?,
            None => self.category.clone(),
        };
        let pricing = Pricing::new(
            patch.mrp.unwrap_or(self.pricing.mrp),
            patch.msp.unwrap_or(self.pricing.msp),
        )?;

        Ok(Self {
            id: self.id.clone(),
            name,
            category,
            pricing,
        })
    }

    pub fn id_typed(&self) -> &ProductId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    /// Unit price recorded on sale lines.
    pub fn reference_price(&self) -> Money {
        self.pricing.msp
    }
}

fn required(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}
