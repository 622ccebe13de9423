//! Sale transaction processing.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};

use inventrack_sales::{record_line, ProcessSale, SaleReceipt};

use crate::error::ServiceError;
use crate::store::{InventoryStore, UnitOfWork};

/// Applies a bill atomically: every line's stock is deducted and recorded, or
/// nothing is.
#[derive(Clone)]
pub struct SaleProcessor {
    store: Arc<dyn InventoryStore>,
}

impl SaleProcessor {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Process a sale dated `sale_date`.
    ///
    /// Lines are locked in the order given, so two bills listing the same
    /// products in opposite order can deadlock; the store reports that as
    /// `Contention`.
    #[instrument(
        skip_all,
        fields(store_id = %sale.store_id, lines = sale.lines.len(), sale_date = %sale_date),
        err
    )]
    pub async fn process(
        &self,
        sale: &ProcessSale,
        sale_date: NaiveDate,
    ) -> Result<SaleReceipt, ServiceError> {
        sale.validate()?;

        let mut uow = self.store.begin().await?;
        if let Err(err) = apply_lines(uow.as_mut(), sale, sale_date).await {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "rollback after failed sale did not complete");
            }
            return Err(err);
        }
        uow.commit().await?;

        info!(declared_total = sale.declared_total, "sale committed");
        Ok(SaleReceipt {
            items_processed: sale.lines.len(),
            store_id: sale.store_id.clone(),
            declared_total: sale.declared_total,
        })
    }
}

async fn apply_lines(
    uow: &mut dyn UnitOfWork,
    sale: &ProcessSale,
    sale_date: NaiveDate,
) -> Result<(), ServiceError> {
    let store_id = &sale.store_id;
    if uow.shop(store_id).await?.is_none() {
        return Err(ServiceError::not_found(format!("shop {store_id} does not exist")));
    }

    let now = Utc::now();
    for line in &sale.lines {
        let mut row = uow
            .lock_inventory(store_id, &line.product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!(
                    "product {} is not stocked by shop {store_id}",
                    line.product_id
                ))
            })?;
        let product = uow.product(&line.product_id).await?.ok_or_else(|| {
            ServiceError::not_found(format!("product {} does not exist", line.product_id))
        })?;

        let record = record_line(&mut row, &product, line.quantity, sale_date, now)?;
        uow.update_stock(&row).await?;
        uow.append_sale(&record).await?;
    }
    Ok(())
}
