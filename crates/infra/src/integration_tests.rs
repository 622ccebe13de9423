//! Integration tests for the service layer over the in-memory store.
//!
//! Verifies:
//! - Multi-line sales deduct every line and record one sale per line
//! - A failing line leaves every inventory row untouched
//! - Concurrent sales on one row serialize and never oversell
//! - Analytics reflect committed sales only

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use inventrack_core::{Money, ProductId, StoreId};
    use inventrack_inventory::{RegisterShop, Shop};
    use inventrack_products::Pricing;
    use inventrack_sales::{DateWindow, KpiTotals, ProcessSale, SaleLine, TrendPoint};

    use crate::catalog::{CatalogService, NewStockedProduct, ProductEdit};
    use crate::error::ServiceError;
    use crate::sale_processor::SaleProcessor;
    use crate::store::{
        InMemoryInventoryStore, InventoryStore, StockedProduct, StoreError, StoreResult, UnitOfWork,
    };
    use crate::SalesAnalyticsService;

    struct Fixture {
        store: Arc<dyn InventoryStore>,
        catalog: CatalogService,
        sales: SaleProcessor,
        analytics: SalesAnalyticsService,
        store_id: StoreId,
    }

    fn register_s1() -> RegisterShop {
        RegisterShop {
            store_id: Some(StoreId::parse("S1").unwrap()),
            shop_name: "Corner Kirana".to_string(),
            address: "12 MG Road".to_string(),
            city: "Pune".to_string(),
            owner_name: "Owner".to_string(),
            owner_email: "owner@example.com".to_string(),
            ..RegisterShop::default()
        }
    }

    fn test_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    async fn setup() -> Fixture {
        setup_with_lock_timeout(Duration::from_secs(2)).await
    }

    async fn setup_with_lock_timeout(lock_timeout: Duration) -> Fixture {
        let store: Arc<dyn InventoryStore> =
            Arc::new(InMemoryInventoryStore::with_lock_timeout(lock_timeout));
        let catalog = CatalogService::new(store.clone());
        let shop = catalog
            .register_shop(register_s1())
            .await
            .unwrap();

        Fixture {
            sales: SaleProcessor::new(store.clone()),
            analytics: SalesAnalyticsService::new(store.clone()),
            catalog,
            store,
            store_id: shop.store_id,
        }
    }

    async fn add_product(fx: &Fixture, name: &str, msp_minor: i64, stock: i64) -> ProductId {
        fx.catalog
            .create_product(
                &fx.store_id,
                NewStockedProduct {
                    name: name.to_string(),
                    category: "Grocery".to_string(),
                    pricing: Pricing::new(
                        Money::from_minor(msp_minor + 500),
                        Money::from_minor(msp_minor),
                    )
                    .unwrap(),
                    stock_quantity: stock,
                },
            )
            .await
            .unwrap()
            .product
            .id_typed()
            .clone()
    }

    fn bill(store_id: &StoreId, lines: &[(&ProductId, i64)]) -> ProcessSale {
        ProcessSale {
            store_id: store_id.clone(),
            lines: lines
                .iter()
                .map(|(p, q)| SaleLine {
                    product_id: (*p).clone(),
                    quantity: *q,
                })
                .collect(),
            declared_total: 0.0,
        }
    }

    async fn stock_of(fx: &Fixture, product_id: &ProductId) -> i64 {
        fx.store
            .list_inventory(&fx.store_id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.product.id_typed() == product_id)
            .map(|s| s.stock_quantity)
            .unwrap()
    }

    #[tokio::test]
    async fn multi_line_sale_deducts_each_line_and_records_revenue() {
        let fx = setup().await;
        let rice = add_product(&fx, "Rice", 1_000, 10).await;
        let dal = add_product(&fx, "Dal", 2_000, 5).await;

        let receipt = fx
            .sales
            .process(&bill(&fx.store_id, &[(&rice, 3), (&dal, 2)]), test_day())
            .await
            .unwrap();
        assert_eq!(receipt.items_processed, 2);

        assert_eq!(stock_of(&fx, &rice).await, 7);
        assert_eq!(stock_of(&fx, &dal).await, 3);

        let report = fx.analytics.report(&fx.store_id, test_day()).await.unwrap();
        assert_eq!(report.kpis.daily.sales_count, 2);
        assert_eq!(report.kpis.daily.units_sold, 5);
        assert_eq!(report.kpis.daily.revenue, Money::from_minor(7_000));
        assert_eq!(report.kpis.overall, report.kpis.daily);
        assert_eq!(report.trend.len(), 1);
    }

    #[tokio::test]
    async fn failing_line_rolls_back_earlier_lines() {
        let fx = setup().await;
        let rice = add_product(&fx, "Rice", 1_000, 10).await;
        let dal = add_product(&fx, "Dal", 2_000, 1).await;

        let err = fx
            .sales
            .process(&bill(&fx.store_id, &[(&rice, 4), (&dal, 2)]), test_day())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientStock { available: 1, requested: 2, .. }
        ));

        assert_eq!(stock_of(&fx, &rice).await, 10);
        assert_eq!(stock_of(&fx, &dal).await, 1);
        let report = fx.analytics.report(&fx.store_id, test_day()).await.unwrap();
        assert_eq!(report.kpis.overall.sales_count, 0);
        assert!(report.trend.is_empty());
    }

    #[tokio::test]
    async fn unknown_shop_and_unstocked_product_are_not_found() {
        let fx = setup().await;
        let rice = add_product(&fx, "Rice", 1_000, 10).await;
        let ghost = ProductId::parse("PGHOST").unwrap();

        let other_shop = StoreId::parse("S404").unwrap();
        let err = fx
            .sales
            .process(&bill(&other_shop, &[(&rice, 1)]), test_day())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = fx
            .sales
            .process(&bill(&fx.store_id, &[(&rice, 1), (&ghost, 1)]), test_day())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(stock_of(&fx, &rice).await, 10);
    }

    #[tokio::test]
    async fn repeated_lines_apply_cumulatively() {
        let fx = setup().await;
        let rice = add_product(&fx, "Rice", 1_000, 5).await;

        let err = fx
            .sales
            .process(&bill(&fx.store_id, &[(&rice, 3), (&rice, 3)]), test_day())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientStock { available: 2, requested: 3, .. }
        ));

        fx.sales
            .process(&bill(&fx.store_id, &[(&rice, 2), (&rice, 3)]), test_day())
            .await
            .unwrap();
        assert_eq!(stock_of(&fx, &rice).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sales_never_oversell() {
        let fx = Arc::new(setup().await);
        let rice = add_product(&fx, "Rice", 1_000, 5).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let fx = fx.clone();
            let sale = bill(&fx.store_id, &[(&rice, 3)]);
            handles.push(tokio::spawn(async move {
                fx.sales.process(&sale, test_day()).await
            }));
        }

        let mut ok = 0;
        let mut short = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(ServiceError::InsufficientStock { available: 2, requested: 3, .. }) => short += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!((ok, short), (1, 1));
        assert_eq!(stock_of(&fx, &rice).await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_single_unit_sales_sell_exactly_the_stock() {
        let fx = Arc::new(setup().await);
        let rice = add_product(&fx, "Rice", 1_000, 20).await;

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let fx = fx.clone();
                let sale = bill(&fx.store_id, &[(&rice, 1)]);
                tokio::spawn(async move { fx.sales.process(&sale, test_day()).await })
            })
            .collect();

        let mut sold = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                sold += 1;
            }
        }

        assert_eq!(sold, 20);
        assert_eq!(stock_of(&fx, &rice).await, 0);
        let report = fx.analytics.report(&fx.store_id, test_day()).await.unwrap();
        assert_eq!(report.kpis.daily.units_sold, 20);
    }

    #[tokio::test]
    async fn duplicate_product_name_conflicts() {
        let fx = setup().await;
        add_product(&fx, "Rice", 1_000, 5).await;

        let err = fx
            .catalog
            .create_product(
                &fx.store_id,
                NewStockedProduct {
                    name: "Rice".to_string(),
                    category: "Grocery".to_string(),
                    pricing: Pricing::new(Money::from_minor(10), Money::from_minor(5)).unwrap(),
                    stock_quantity: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn product_edit_sets_stock_and_checks_price_band() {
        let fx = setup().await;
        let rice = add_product(&fx, "Rice", 1_000, 5).await;

        let mut edit = ProductEdit {
            stock_quantity: Some(42),
            ..ProductEdit::default()
        };
        edit.patch.category = Some("Staples".to_string());
        let updated = fx.catalog.update_product(&fx.store_id, &rice, edit).await.unwrap();
        assert_eq!(updated.stock_quantity, 42);
        assert_eq!(updated.product.category(), "Staples");

        let mut bad = ProductEdit::default();
        bad.patch.msp = Some(Money::from_minor(99_999));
        let err = fx.catalog.update_product(&fx.store_id, &rice, bad).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(stock_of(&fx, &rice).await, 42);
    }

    #[tokio::test]
    async fn csv_upload_tops_up_creates_and_skips() {
        let fx = setup().await;
        let rice = add_product(&fx, "Rice", 1_000, 5).await;

        let csv = "product_name,category,mrp,msp,stock_quantity\n\
                   Rice,,,,10\n\
                   Sugar,Grocery,55,48.5,20\n\
                   Salt,,,,3\n\
                   Oil,Grocery,200,180,abc\n";
        let summary = fx.catalog.import_stock_csv(&fx.store_id, csv).await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(stock_of(&fx, &rice).await, 15);

        let listed = fx.catalog.list_inventory(&fx.store_id).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|s| s.product.name()).collect();
        assert_eq!(names, vec!["Rice", "Sugar"]);
    }

    #[tokio::test]
    async fn analytics_for_unknown_shop_is_not_found() {
        let fx = setup().await;
        let err = fx
            .analytics
            .report(&StoreId::parse("S404").unwrap(), test_day())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn lock_timeout_mid_sale_is_contention_and_rolls_back() {
        let fx = setup_with_lock_timeout(Duration::from_millis(50)).await;
        let rice = add_product(&fx, "Rice", 1_000, 10).await;
        let dal = add_product(&fx, "Dal", 2_000, 10).await;

        let mut holder = fx.store.begin().await.unwrap();
        holder.lock_inventory(&fx.store_id, &dal).await.unwrap();

        let err = fx
            .sales
            .process(&bill(&fx.store_id, &[(&rice, 3), (&dal, 1)]), test_day())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Contention(_)));
        assert!(err.is_retryable());
        assert_eq!(stock_of(&fx, &rice).await, 10);

        holder.rollback().await.unwrap();
        fx.sales
            .process(&bill(&fx.store_id, &[(&rice, 3), (&dal, 1)]), test_day())
            .await
            .unwrap();
        assert_eq!(stock_of(&fx, &rice).await, 7);
        assert_eq!(stock_of(&fx, &dal).await, 9);
    }

    #[tokio::test]
    async fn sales_of_unknown_products_leave_no_lock_cells_behind() {
        let store = Arc::new(InMemoryInventoryStore::new());
        let catalog = CatalogService::new(store.clone());
        let sales = SaleProcessor::new(store.clone());
        let shop = catalog.register_shop(register_s1()).await.unwrap();

        for i in 0..500 {
            let ghost = ProductId::parse(format!("PGHOST{i}")).unwrap();
            let err = sales
                .process(&bill(&shop.store_id, &[(&ghost, 1)]), test_day())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotFound(_)));
        }
        assert_eq!(store.row_lock_cells(), 0);
    }

    /// Store whose shop lookups succeed but whose sales queries fail.
    struct FailingSalesQueries {
        shop: Shop,
    }

    #[async_trait]
    impl InventoryStore for FailingSalesQueries {
        async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
            Err(StoreError::Backend("read-only stub".to_string()))
        }

        async fn get_shop(&self, _store_id: &StoreId) -> StoreResult<Option<Shop>> {
            Ok(Some(self.shop.clone()))
        }

        async fn list_inventory(&self, _store_id: &StoreId) -> StoreResult<Vec<StockedProduct>> {
            Ok(Vec::new())
        }

        async fn sales_totals(
            &self,
            _store_id: &StoreId,
            _window: DateWindow,
        ) -> StoreResult<KpiTotals> {
            Err(StoreError::Backend("connection reset by peer".to_string()))
        }

        async fn daily_revenue(
            &self,
            _store_id: &StoreId,
            _window: DateWindow,
        ) -> StoreResult<Vec<TrendPoint>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn analytics_query_failure_is_internal_with_cause() {
        let store = FailingSalesQueries {
            shop: Shop::register(register_s1()).unwrap(),
        };
        let analytics = SalesAnalyticsService::new(Arc::new(store));

        let err = analytics
            .report(&StoreId::parse("S1").unwrap(), test_day())
            .await
            .unwrap_err();
        match err {
            ServiceError::Internal(msg) => assert!(msg.contains("connection reset by peer"), "{msg}"),
            other => panic!("expected internal error, got {other:?}"),
        }
    }
}
