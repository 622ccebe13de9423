//! Shop, product and stock maintenance.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use inventrack_core::{ProductId, StoreId};
use inventrack_inventory::{parse_stock_csv, ImportRow, InventoryRow, RegisterShop, Shop};
use inventrack_products::{CreateProduct, Pricing, Product, UpdateProduct};

use crate::error::ServiceError;
use crate::store::{InventoryStore, StockedProduct, UnitOfWork};

/// Product creation request: catalog fields plus the shop's opening stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockedProduct {
    pub name: String,
    pub category: String,
    pub pricing: Pricing,
    pub stock_quantity: i64,
}

/// Product edit: catalog patch plus an optional new stock level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductEdit {
    pub patch: UpdateProduct,
    pub stock_quantity: Option<i64>,
}

/// Outcome of a CSV stock upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// New products and new inventory rows.
    pub created: usize,
    /// Existing inventory rows topped up.
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn InventoryStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, err)]
    pub async fn register_shop(&self, cmd: RegisterShop) -> Result<Shop, ServiceError> {
        let shop = Shop::register(cmd)?;
        self.in_unit_of_work(|uow| {
            Box::pin(async move {
                if uow.shop(&shop.store_id).await?.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "shop {} already exists",
                        shop.store_id
                    )));
                }
                uow.insert_shop(&shop).await?;
                info!(store_id = %shop.store_id, "shop registered");
                Ok(shop)
            })
        })
        .await
    }

    pub async fn get_shop(&self, store_id: &StoreId) -> Result<Shop, ServiceError> {
        self.store
            .get_shop(store_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("shop {store_id} does not exist")))
    }

    /// Create a catalog product and stock it at `store_id`.
    #[instrument(skip_all, fields(store_id = %store_id), err)]
    pub async fn create_product(
        &self,
        store_id: &StoreId,
        req: NewStockedProduct,
    ) -> Result<StockedProduct, ServiceError> {
        let product = Product::create(CreateProduct {
            product_id: ProductId::generate(),
            name: req.name,
            category: req.category,
            pricing: req.pricing,
        })?;
        let row = InventoryRow::open(
            store_id.clone(),
            product.id_typed().clone(),
            req.stock_quantity,
            Utc::now(),
        )?;

        self.in_unit_of_work(|uow| {
            Box::pin(async move {
                ensure_shop(uow, row.store_id()).await?;
                if uow.product_by_name(product.name()).await?.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "product with name '{}' already exists",
                        product.name()
                    )));
                }
                uow.insert_product(&product).await?;
                uow.insert_inventory(&row).await?;
                info!(product_id = %product.id_typed(), "product created");
                Ok(StockedProduct {
                    product,
                    stock_quantity: row.stock_quantity(),
                    last_updated: row.last_updated(),
                })
            })
        })
        .await
    }

    pub async fn list_inventory(&self, store_id: &StoreId) -> Result<Vec<StockedProduct>, ServiceError> {
        self.get_shop(store_id).await?;
        Ok(self.store.list_inventory(store_id).await?)
    }

    /// Edit a product stocked by `store_id`, optionally setting its stock.
    #[instrument(skip_all, fields(store_id = %store_id, product_id = %product_id), err)]
    pub async fn update_product(
        &self,
        store_id: &StoreId,
        product_id: &ProductId,
        edit: ProductEdit,
    ) -> Result<StockedProduct, ServiceError> {
        let store_id = store_id.clone();
        let product_id = product_id.clone();
        self.in_unit_of_work(|uow| {
            Box::pin(async move {
                let mut row = uow
                    .lock_inventory(&store_id, &product_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::not_found(format!(
                            "product {product_id} is not stocked by shop {store_id}"
                        ))
                    })?;
                let current = uow.product(&product_id).await?.ok_or_else(|| {
                    ServiceError::not_found(format!("product {product_id} does not exist"))
                })?;

                let product = current.updated(&edit.patch)?;
                if product != current {
                    uow.update_product(&product).await?;
                }
                if let Some(qty) = edit.stock_quantity {
                    row.set_quantity(qty, Utc::now())?;
                    uow.update_stock(&row).await?;
                }
                Ok(StockedProduct {
                    product,
                    stock_quantity: row.stock_quantity(),
                    last_updated: row.last_updated(),
                })
            })
        })
        .await
    }

    /// Apply an uploaded CSV stock sheet to `store_id` in one unit of work.
    #[instrument(skip_all, fields(store_id = %store_id), err)]
    pub async fn import_stock_csv(
        &self,
        store_id: &StoreId,
        csv_text: &str,
    ) -> Result<ImportSummary, ServiceError> {
        let import = parse_stock_csv(csv_text)?;
        let store_id = store_id.clone();

        let summary = self
            .in_unit_of_work(|uow| {
                Box::pin(async move {
                    ensure_shop(uow, &store_id).await?;
                    let mut summary = ImportSummary {
                        skipped: import.skipped,
                        ..ImportSummary::default()
                    };
                    for row in import.rows {
                        match apply_import_row(uow, &store_id, row).await? {
                            Some(RowOutcome::Created) => summary.created += 1,
                            Some(RowOutcome::Updated) => summary.updated += 1,
                            None => summary.skipped += 1,
                        }
                    }
                    Ok(summary)
                })
            })
            .await?;

        info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            "stock upload applied"
        );
        Ok(summary)
    }

    /// Run `work` in a fresh unit of work, committing on success and rolling
    /// back on failure.
    async fn in_unit_of_work<T, F>(&self, work: F) -> Result<T, ServiceError>
    where
        F: for<'u> FnOnce(
            &'u mut dyn UnitOfWork,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<T, ServiceError>> + Send + 'u>,
        >,
    {
        let mut uow = self.store.begin().await?;
        match work(uow.as_mut()).await {
            Ok(value) => {
                uow.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "rollback did not complete");
                }
                Err(err)
            }
        }
    }
}

enum RowOutcome {
    Created,
    Updated,
}

async fn ensure_shop(uow: &mut dyn UnitOfWork, store_id: &StoreId) -> Result<(), ServiceError> {
    match uow.shop(store_id).await? {
        Some(_) => Ok(()),
        None => Err(ServiceError::not_found(format!("shop {store_id} does not exist"))),
    }
}

/// `None` means the row could not be applied and was skipped.
async fn apply_import_row(
    uow: &mut dyn UnitOfWork,
    store_id: &StoreId,
    row: ImportRow,
) -> Result<Option<RowOutcome>, ServiceError> {
    let now = Utc::now();
    let product = match uow.product_by_name(&row.product_name).await? {
        Some(existing) => existing,
        None => {
            let Some(details) = row.details else {
                return Ok(None);
            };
            let product = Product::create(CreateProduct {
                product_id: ProductId::generate(),
                name: row.product_name,
                category: details.category,
                pricing: details.pricing,
            })?;
            uow.insert_product(&product).await?;
            product
        }
    };

    match uow.lock_inventory(store_id, product.id_typed()).await? {
        Some(mut stocked) => {
            stocked.restock(row.stock_quantity, now)?;
            uow.update_stock(&stocked).await?;
            Ok(Some(RowOutcome::Updated))
        }
        None => {
            let fresh = InventoryRow::open(
                store_id.clone(),
                product.id_typed().clone(),
                row.stock_quantity,
                now,
            )?;
            uow.insert_inventory(&fresh).await?;
            Ok(Some(RowOutcome::Created))
        }
    }
}
