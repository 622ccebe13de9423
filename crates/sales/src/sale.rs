use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use inventrack_core::{DomainError, DomainResult, Money, ProductId, StoreId};
use inventrack_inventory::InventoryRow;
use inventrack_products::Product;

/// One bill line: product and units sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Command: ProcessSale.
///
/// `declared_total` is what the till computed. It is echoed back on success
/// and never checked against catalog prices.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSale {
    pub store_id: StoreId,
    pub lines: Vec<SaleLine>,
    pub declared_total: f64,
}

impl ProcessSale {
    /// Stateless checks that do not need the store.
    pub fn validate(&self) -> DomainResult<()> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("a sale needs at least one item"));
        }
        if let Some(line) = self.lines.iter().find(|l| l.quantity <= 0) {
            return Err(DomainError::validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        if !self.declared_total.is_finite() {
            return Err(DomainError::validation("total_amount must be a finite number"));
        }
        Ok(())
    }
}

/// Immutable, append-only sale line as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub date: NaiveDate,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub units_sold: i64,
    pub unit_price: Money,
    pub discount: Money,
}

impl SaleRecord {
    pub fn revenue(&self) -> Money {
        self.unit_price.times(self.units_sold)
    }
}

/// Outcome of a committed sale.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleReceipt {
    pub items_processed: usize,
    pub store_id: StoreId,
    pub declared_total: f64,
}

/// Deduct one line from a locked inventory row and build its sale record.
///
/// The row is left untouched when stock is short. Discounts are not applied
/// yet, so every record carries a zero discount.
pub fn record_line(
    row: &mut InventoryRow,
    product: &Product,
    quantity: i64,
    sale_date: NaiveDate,
    at: DateTime<Utc>,
) -> DomainResult<SaleRecord> {
    if row.product_id() != product.id_typed() {
        return Err(DomainError::validation(format!(
            "inventory row is for product {}, not {}",
            row.product_id(),
            product.id_typed()
        )));
    }
    row.deduct(quantity, at)?;

    Ok(SaleRecord {
        date: sale_date,
        store_id: row.store_id().clone(),
        product_id: row.product_id().clone(),
        units_sold: quantity,
        unit_price: product.reference_price(),
        discount: Money::ZERO,
    })
}
