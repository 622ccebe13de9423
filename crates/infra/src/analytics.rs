//! Sales analytics service.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::instrument;

use inventrack_core::StoreId;
use inventrack_sales::{trend_window, Period, PeriodKpis, SalesAnalytics};

use crate::error::ServiceError;
use crate::store::{InventoryStore, StoreError};

/// Read-only KPI and trend reporting.
#[derive(Clone)]
pub struct SalesAnalyticsService {
    store: Arc<dyn InventoryStore>,
}

impl SalesAnalyticsService {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(store_id = %store_id, today = %today), err)]
    pub async fn report(
        &self,
        store_id: &StoreId,
        today: NaiveDate,
    ) -> Result<SalesAnalytics, ServiceError> {
        if self.store.get_shop(store_id).await.map_err(query_failed)?.is_none() {
            return Err(ServiceError::not_found(format!("shop {store_id} does not exist")));
        }

        let mut kpis = PeriodKpis::default();
        for period in Period::ALL {
            let totals = self
                .store
                .sales_totals(store_id, period.window(today))
                .await
                .map_err(query_failed)?;
            kpis.set(period, totals);
        }

        let trend = self
            .store
            .daily_revenue(store_id, trend_window(today))
            .await
            .map_err(query_failed)?;

        Ok(SalesAnalytics {
            store_id: store_id.clone(),
            today,
            kpis,
            trend,
        })
    }
}

fn query_failed(err: StoreError) -> ServiceError {
    ServiceError::Internal(format!("analytics query failed: {err}"))
}
