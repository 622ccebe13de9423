use chrono::{DateTime, Utc};

use inventrack_core::{DomainError, DomainResult, ProductId, StoreId};

/// Stock of one product held by one shop. Unique per `(store_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    key: (StoreId, ProductId),
    stock_quantity: i64,
    last_updated: Option<DateTime<Utc>>,
}

impl InventoryRow {
    /// Open a new inventory row with an initial quantity.
    pub fn open(
        store_id: StoreId,
        product_id: ProductId,
        stock_quantity: i64,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_non_negative(stock_quantity)?;
        Ok(Self {
            key: (store_id, product_id),
            stock_quantity,
            last_updated: Some(at),
        })
    }

    /// Rebuild a row from persisted columns.
    pub fn restore(
        store_id: StoreId,
        product_id: ProductId,
        stock_quantity: i64,
        last_updated: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key: (store_id, product_id),
            stock_quantity,
            last_updated,
        }
    }

    pub fn store_id(&self) -> &StoreId {
        &self.key.0
    }

    pub fn product_id(&self) -> &ProductId {
        &self.key.1
    }

    pub fn stock_quantity(&self) -> i64 {
        self.stock_quantity
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Remove sold units. Fails without touching the row if stock is short.
    pub fn deduct(&mut self, quantity: i64, at: DateTime<Utc>) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.stock_quantity < quantity {
            return Err(DomainError::insufficient_stock(
                self.product_id().as_str(),
                self.stock_quantity,
                quantity,
            ));
        }
        self.stock_quantity -= quantity;
        self.last_updated = Some(at);
        Ok(())
    }

    /// Add received units (bulk upload semantics).
    pub fn restock(&mut self, quantity: i64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_non_negative(quantity)?;
        self.stock_quantity = self
            .stock_quantity
            .checked_add(quantity)
            .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;
        self.last_updated = Some(at);
        Ok(())
    }

    /// Overwrite the on-hand quantity (manual correction).
    pub fn set_quantity(&mut self, quantity: i64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_non_negative(quantity)?;
        self.stock_quantity = quantity;
        self.last_updated = Some(at);
        Ok(())
    }
}

fn ensure_non_negative(quantity: i64) -> DomainResult<()> {
    if quantity < 0 {
        return Err(DomainError::validation("stock quantity cannot be negative"));
    }
    Ok(())
}
