//! Persistence boundary for shops, catalog, inventory and sale records.
//!
//! Writes go through a [`UnitOfWork`] acquired from an [`InventoryStore`].
//! A unit of work is one database transaction: nothing it stages is visible
//! to others until `commit`, and dropping it without committing rolls back.
//!
//! Inventory rows are locked pessimistically with
//! [`UnitOfWork::lock_inventory`]. A second unit of work locking the same row
//! waits until the first one finishes, then sees its committed quantity.
//! Waits are bounded; a timeout or deadlock surfaces as
//! [`StoreError::Contention`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use inventrack_core::{ProductId, StoreId};
use inventrack_inventory::{InventoryRow, Shop};
use inventrack_products::Product;
use inventrack_sales::{DateWindow, KpiTotals, SaleRecord, TrendPoint};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;

/// Persistence failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lock wait timed out, deadlock, or serialization failure. Retryable.
    #[error("lock contention: {0}")]
    Contention(String),

    /// A unique key already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A catalog product together with one shop's stock of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockedProduct {
    pub product: Product,
    pub stock_quantity: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Handle to the backing store. Cheap to share behind an `Arc`.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Start a unit of work (transaction).
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn get_shop(&self, store_id: &StoreId) -> StoreResult<Option<Shop>>;

    /// Products stocked by a shop, ordered by product name.
    async fn list_inventory(&self, store_id: &StoreId) -> StoreResult<Vec<StockedProduct>>;

    /// Count, units and revenue of a shop's sale records inside `window`.
    async fn sales_totals(&self, store_id: &StoreId, window: DateWindow) -> StoreResult<KpiTotals>;

    /// Revenue per day inside `window`, ascending, days without sales omitted.
    async fn daily_revenue(
        &self,
        store_id: &StoreId,
        window: DateWindow,
    ) -> StoreResult<Vec<TrendPoint>>;
}

/// One transaction against the store.
///
/// Reads observe this unit's own staged writes.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn shop(&mut self, store_id: &StoreId) -> StoreResult<Option<Shop>>;

    /// Fails with `Conflict` on a duplicate store id or verification id.
    async fn insert_shop(&mut self, shop: &Shop) -> StoreResult<()>;

    async fn product(&mut self, product_id: &ProductId) -> StoreResult<Option<Product>>;

    async fn product_by_name(&mut self, name: &str) -> StoreResult<Option<Product>>;

    /// Fails with `Conflict` on a duplicate product id or name.
    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;

    async fn update_product(&mut self, product: &Product) -> StoreResult<()>;

    /// Load and exclusively lock the row for `(store_id, product_id)`.
    ///
    /// The lock is held until the unit of work ends. Locking a row this unit
    /// already holds returns its current (possibly staged) state.
    async fn lock_inventory(
        &mut self,
        store_id: &StoreId,
        product_id: &ProductId,
    ) -> StoreResult<Option<InventoryRow>>;

    async fn insert_inventory(&mut self, row: &InventoryRow) -> StoreResult<()>;

    /// Write back the quantity of a row previously returned by
    /// `lock_inventory` (or inserted by this unit).
    async fn update_stock(&mut self, row: &InventoryRow) -> StoreResult<()>;

    async fn append_sale(&mut self, record: &SaleRecord) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
