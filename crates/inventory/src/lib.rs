//! Inventory domain module.
//!
//! Shops, their per-product stock rows, and bulk stock imports. Pure domain
//! logic (no IO, no HTTP, no storage).

pub mod import;
pub mod shop;
pub mod stock;

pub use import::{parse_stock_csv, ImportRow, NewProductDetails, StockImport};
pub use shop::{RegisterShop, Shop, DEFAULT_SHOP_STATUS};
pub use stock::InventoryRow;
