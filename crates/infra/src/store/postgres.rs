//! Postgres-backed store.
//!
//! A unit of work wraps one `sqlx` transaction. Row locks are taken with
//! `SELECT ... FOR UPDATE`; each transaction sets a local `lock_timeout` so
//! waits are bounded.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (lock not available) | `55P03` | `Contention` | `lock_timeout` expired waiting for a row lock |
//! | Database (deadlock detected) | `40P01` | `Contention` | Two sales locked the same rows in opposite order |
//! | Database (serialization failure) | `40001` | `Contention` | Concurrent update could not be serialized |
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate store id, verification id, product name or inventory pairing |
//! | Database (other) | Any other | `Backend` | Check/foreign key violations and the rest |
//! | PoolTimedOut / PoolClosed / Io / other | N/A | `Backend` | Connection problems |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use inventrack_core::{Money, ProductId, StoreId};
use inventrack_inventory::{InventoryRow, Shop};
use inventrack_products::{Pricing, Product};
use inventrack_sales::{DateWindow, KpiTotals, SaleRecord, TrendPoint};

use super::{InventoryStore, StockedProduct, StoreError, StoreResult, UnitOfWork};

const SCHEMA: &str = include_str!("schema.sql");

const SHOP_COLUMNS: &str = "store_id, shop_name, business_verification_id, address, city, \
                            shop_phone, store_type, status, owner_name, owner_email";
const PRODUCT_COLUMNS: &str = "product_id, product_name, category, mrp_minor, msp_minor";

/// Postgres [`InventoryStore`].
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Open a connection pool.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Create tables and indexes that do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(lock_timeout_setting(self.lock_timeout))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    #[instrument(skip_all, fields(store_id = %store_id), err)]
    async fn get_shop(&self, store_id: &StoreId) -> StoreResult<Option<Shop>> {
        let sql = format!("SELECT {SHOP_COLUMNS} FROM shops WHERE store_id = $1");
        sqlx::query(&sql)
            .bind(store_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_shop", e))?
            .map(|row| shop_from_row(&row))
            .transpose()
    }

    #[instrument(skip_all, fields(store_id = %store_id), err)]
    async fn list_inventory(&self, store_id: &StoreId) -> StoreResult<Vec<StockedProduct>> {
        let rows = sqlx::query(
            r#"
            SELECT p.product_id, p.product_name, p.category, p.mrp_minor, p.msp_minor,
                   i.stock_quantity, i.last_updated
            FROM inventory i
            JOIN products p ON p.product_id = i.product_id
            WHERE i.store_id = $1
            ORDER BY p.product_name
            "#,
        )
        .bind(store_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_inventory", e))?;

        rows.iter()
            .map(|row| -> StoreResult<StockedProduct> {
                Ok(StockedProduct {
                    product: product_from_row(row)?,
                    stock_quantity: column(row, "stock_quantity")?,
                    last_updated: column(row, "last_updated")?,
                })
            })
            .collect()
    }

    #[instrument(skip_all, fields(store_id = %store_id, from = %window.from, to = %window.to), err)]
    async fn sales_totals(&self, store_id: &StoreId, window: DateWindow) -> StoreResult<KpiTotals> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS sales_count,
                   COALESCE(SUM(units_sold), 0)::BIGINT AS units_sold,
                   COALESCE(SUM(units_sold * unit_price_minor), 0)::BIGINT AS revenue_minor
            FROM sales_records
            WHERE store_id = $1 AND sale_date BETWEEN $2 AND $3
            "#,
        )
        .bind(store_id.as_str())
        .bind(window.from)
        .bind(window.to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sales_totals", e))?;

        let count: i64 = column(&row, "sales_count")?;
        Ok(KpiTotals {
            sales_count: u64::try_from(count)
                .map_err(|_| StoreError::Backend(format!("negative sales count {count}")))?,
            units_sold: column(&row, "units_sold")?,
            revenue: Money::from_minor(column(&row, "revenue_minor")?),
        })
    }

    #[instrument(skip_all, fields(store_id = %store_id, from = %window.from, to = %window.to), err)]
    async fn daily_revenue(
        &self,
        store_id: &StoreId,
        window: DateWindow,
    ) -> StoreResult<Vec<TrendPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT sale_date, SUM(units_sold * unit_price_minor)::BIGINT AS revenue_minor
            FROM sales_records
            WHERE store_id = $1 AND sale_date BETWEEN $2 AND $3
            GROUP BY sale_date
            ORDER BY sale_date
            "#,
        )
        .bind(store_id.as_str())
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("daily_revenue", e))?;

        rows.iter()
            .map(|row| -> StoreResult<TrendPoint> {
                Ok(TrendPoint {
                    date: column::<NaiveDate>(row, "sale_date")?,
                    revenue: Money::from_minor(column(row, "revenue_minor")?),
                })
            })
            .collect()
    }
}

struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn shop(&mut self, store_id: &StoreId) -> StoreResult<Option<Shop>> {
        let sql = format!("SELECT {SHOP_COLUMNS} FROM shops WHERE store_id = $1");
        sqlx::query(&sql)
            .bind(store_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("shop", e))?
            .map(|row| shop_from_row(&row))
            .transpose()
    }

    async fn insert_shop(&mut self, shop: &Shop) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO shops ({SHOP_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        sqlx::query(&sql)
            .bind(shop.store_id.as_str())
            .bind(&shop.shop_name)
            .bind(shop.business_verification_id.as_deref())
            .bind(&shop.address)
            .bind(&shop.city)
            .bind(shop.shop_phone.as_deref())
            .bind(shop.store_type.as_deref())
            .bind(&shop.status)
            .bind(&shop.owner_name)
            .bind(&shop.owner_email)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_shop", e))?;
        Ok(())
    }

    async fn product(&mut self, product_id: &ProductId) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1");
        sqlx::query(&sql)
            .bind(product_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("product", e))?
            .map(|row| product_from_row(&row))
            .transpose()
    }

    async fn product_by_name(&mut self, name: &str) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_name = $1");
        sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("product_by_name", e))?
            .map(|row| product_from_row(&row))
            .transpose()
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        let sql = format!("INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5)");
        let pricing = product.pricing();
        sqlx::query(&sql)
            .bind(product.id_typed().as_str())
            .bind(product.name())
            .bind(product.category())
            .bind(pricing.mrp.minor())
            .bind(pricing.msp.minor())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<()> {
        let pricing = product.pricing();
        let result = sqlx::query(
            r#"
            UPDATE products
            SET product_name = $2, category = $3, mrp_minor = $4, msp_minor = $5
            WHERE product_id = $1
            "#,
        )
        .bind(product.id_typed().as_str())
        .bind(product.name())
        .bind(product.category())
        .bind(pricing.mrp.minor())
        .bind(pricing.msp.minor())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "update of unknown product {}",
                product.id_typed()
            )));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(store_id = %store_id, product_id = %product_id), err)]
    async fn lock_inventory(
        &mut self,
        store_id: &StoreId,
        product_id: &ProductId,
    ) -> StoreResult<Option<InventoryRow>> {
        sqlx::query(
            r#"
            SELECT store_id, product_id, stock_quantity, last_updated
            FROM inventory
            WHERE store_id = $1 AND product_id = $2
            FOR UPDATE
            "#,
        )
        .bind(store_id.as_str())
        .bind(product_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_inventory", e))?
        .map(|row| inventory_from_row(&row))
        .transpose()
    }

    async fn insert_inventory(&mut self, row: &InventoryRow) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory (store_id, product_id, stock_quantity, last_updated)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(row.store_id().as_str())
        .bind(row.product_id().as_str())
        .bind(row.stock_quantity())
        .bind(row.last_updated())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_inventory", e))?;
        Ok(())
    }

    async fn update_stock(&mut self, row: &InventoryRow) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory
            SET stock_quantity = $3, last_updated = $4
            WHERE store_id = $1 AND product_id = $2
            "#,
        )
        .bind(row.store_id().as_str())
        .bind(row.product_id().as_str())
        .bind(row.stock_quantity())
        .bind(row.last_updated())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_stock", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "inventory row {}/{} does not exist",
                row.store_id(),
                row.product_id()
            )));
        }
        Ok(())
    }

    async fn append_sale(&mut self, record: &SaleRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales_records
                (sale_date, store_id, product_id, units_sold, unit_price_minor, discount_minor)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.date)
        .bind(record.store_id.as_str())
        .bind(record.product_id.as_str())
        .bind(record.units_sold)
        .bind(record.unit_price.minor())
        .bind(record.discount.minor())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_sale", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Value for `set_config('lock_timeout', ...)`, in milliseconds.
fn lock_timeout_setting(timeout: Duration) -> String {
    format!("{}ms", timeout.as_millis().max(1))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to read column {name}: {e}")))
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("stored {what} is invalid: {err}"))
}

fn shop_from_row(row: &PgRow) -> StoreResult<Shop> {
    let store_id: String = column(row, "store_id")?;
    Ok(Shop {
        store_id: StoreId::parse(store_id).map_err(|e| corrupt("store id", e))?,
        shop_name: column(row, "shop_name")?,
        business_verification_id: column(row, "business_verification_id")?,
        address: column(row, "address")?,
        city: column(row, "city")?,
        shop_phone: column(row, "shop_phone")?,
        store_type: column(row, "store_type")?,
        status: column(row, "status")?,
        owner_name: column(row, "owner_name")?,
        owner_email: column(row, "owner_email")?,
    })
}

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    let product_id: String = column(row, "product_id")?;
    Ok(Product::restore(
        ProductId::parse(product_id).map_err(|e| corrupt("product id", e))?,
        column(row, "product_name")?,
        column(row, "category")?,
        Pricing {
            mrp: Money::from_minor(column(row, "mrp_minor")?),
            msp: Money::from_minor(column(row, "msp_minor")?),
        },
    ))
}

fn inventory_from_row(row: &PgRow) -> StoreResult<InventoryRow> {
    let store_id: String = column(row, "store_id")?;
    let product_id: String = column(row, "product_id")?;
    Ok(InventoryRow::restore(
        StoreId::parse(store_id).map_err(|e| corrupt("store id", e))?,
        ProductId::parse(product_id).map_err(|e| corrupt("product id", e))?,
        column(row, "stock_quantity")?,
        column::<Option<DateTime<Utc>>>(row, "last_updated")?,
    ))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("40P01") | Some("40001") => StoreError::Contention(msg),
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
