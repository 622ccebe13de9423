//! In-memory store for tests and development.
//!
//! Committed state lives in plain maps behind a `RwLock`. Each inventory row
//! has its own async mutex; a unit of work keeps the owned guards of every
//! row it locked and stages all writes locally, publishing them under the
//! table lock at commit. Readers never wait on row locks and only ever see
//! committed data.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::instrument;

use inventrack_core::{ProductId, StoreId};
use inventrack_inventory::{InventoryRow, Shop};
use inventrack_products::Product;
use inventrack_sales::{self as sales, DateWindow, KpiTotals, SaleRecord, TrendPoint};

use super::{InventoryStore, StockedProduct, StoreError, StoreResult, UnitOfWork};

type RowKey = (StoreId, ProductId);

/// Default bound on how long a unit of work waits for a row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Tables {
    shops: BTreeMap<StoreId, Shop>,
    products: BTreeMap<ProductId, Product>,
    inventory: BTreeMap<RowKey, InventoryRow>,
    sales: Vec<SaleRecord>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowLock<()>>>>,
}

impl Shared {
    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| poisoned())
    }

    fn row_lock(&self, key: &RowKey) -> StoreResult<Arc<RowLock<()>>> {
        let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
        Ok(locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RowLock::new(())))
            .clone())
    }

    /// Forget lock cells that nobody holds or waits on.
    ///
    /// Every holder and waiter keeps a clone of the cell, so a strong count
    /// of one means only the map refers to it. Clones are only taken under
    /// the map mutex, which makes the check race-free.
    fn release_row_locks<'k>(&self, keys: impl IntoIterator<Item = &'k RowKey>) {
        let Ok(mut locks) = self.row_locks.lock() else {
            return;
        };
        for key in keys {
            if locks.get(key).is_some_and(|cell| Arc::strong_count(cell) == 1) {
                locks.remove(key);
            }
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

/// In-memory [`InventoryStore`].
#[derive(Debug, Clone)]
pub struct InMemoryInventoryStore {
    shared: Arc<Shared>,
    lock_timeout: Duration,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            lock_timeout,
        }
    }

    /// Number of live row-lock cells.
    #[cfg(test)]
    pub(crate) fn row_lock_cells(&self) -> usize {
        self.shared.row_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

impl Default for InMemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(InMemoryUnitOfWork {
            shared: self.shared.clone(),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            shops: Vec::new(),
            products: BTreeMap::new(),
            inventory: BTreeMap::new(),
            sales: Vec::new(),
        }))
    }

    async fn get_shop(&self, store_id: &StoreId) -> StoreResult<Option<Shop>> {
        Ok(self.shared.read()?.shops.get(store_id).cloned())
    }

    async fn list_inventory(&self, store_id: &StoreId) -> StoreResult<Vec<StockedProduct>> {
        let tables = self.shared.read()?;
        let mut stocked: Vec<StockedProduct> = tables
            .inventory
            .iter()
            .filter(|((store, _), _)| store == store_id)
            .filter_map(|((_, product_id), row)| {
                tables.products.get(product_id).map(|product| StockedProduct {
                    product: product.clone(),
                    stock_quantity: row.stock_quantity(),
                    last_updated: row.last_updated(),
                })
            })
            .collect();
        stocked.sort_by(|a, b| a.product.name().cmp(b.product.name()));
        Ok(stocked)
    }

    async fn sales_totals(&self, store_id: &StoreId, window: DateWindow) -> StoreResult<KpiTotals> {
        Ok(sales::summarize(&self.shared.read()?.sales, store_id, window))
    }

    async fn daily_revenue(
        &self,
        store_id: &StoreId,
        window: DateWindow,
    ) -> StoreResult<Vec<TrendPoint>> {
        Ok(sales::daily_revenue(&self.shared.read()?.sales, store_id, window))
    }
}

#[derive(Debug)]
enum Staged<T> {
    Insert(T),
    Update(T),
}

impl<T> Staged<T> {
    fn value(&self) -> &T {
        match self {
            Staged::Insert(v) | Staged::Update(v) => v,
        }
    }

    /// Replace the value, keeping an insert an insert.
    fn replace(&mut self, value: T) {
        match self {
            Staged::Insert(v) | Staged::Update(v) => *v = value,
        }
    }
}

struct InMemoryUnitOfWork {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    shops: Vec<Shop>,
    products: BTreeMap<ProductId, Staged<Product>>,
    inventory: BTreeMap<RowKey, Staged<InventoryRow>>,
    sales: Vec<SaleRecord>,
}

impl InMemoryUnitOfWork {
    fn visible_shop(&self, store_id: &StoreId) -> StoreResult<Option<Shop>> {
        if let Some(shop) = self.shops.iter().find(|s| &s.store_id == store_id) {
            return Ok(Some(shop.clone()));
        }
        Ok(self.shared.read()?.shops.get(store_id).cloned())
    }

    fn visible_product(&self, product_id: &ProductId) -> StoreResult<Option<Product>> {
        if let Some(staged) = self.products.get(product_id) {
            return Ok(Some(staged.value().clone()));
        }
        Ok(self.shared.read()?.products.get(product_id).cloned())
    }

    fn visible_product_by_name(&self, name: &str) -> StoreResult<Option<Product>> {
        if let Some(staged) = self.products.values().find(|p| p.value().name() == name) {
            return Ok(Some(staged.value().clone()));
        }
        let tables = self.shared.read()?;
        Ok(tables
            .products
            .values()
            .find(|p| p.name() == name && !self.products.contains_key(p.id_typed()))
            .cloned())
    }

    fn visible_row(&self, key: &RowKey) -> StoreResult<Option<InventoryRow>> {
        if let Some(staged) = self.inventory.get(key) {
            return Ok(Some(staged.value().clone()));
        }
        Ok(self.shared.read()?.inventory.get(key).cloned())
    }

    fn name_taken_by_other(&self, product: &Product) -> StoreResult<bool> {
        Ok(self
            .visible_product_by_name(product.name())?
            .is_some_and(|other| other.id_typed() != product.id_typed()))
    }

    /// Re-check uniqueness against committed state and publish staged writes.
    fn publish(&mut self) -> StoreResult<()> {
        let mut tables = self.shared.tables.write().map_err(|_| poisoned())?;

        for shop in &self.shops {
            if let Some(msg) = shop_conflict(tables.shops.values(), shop) {
                return Err(StoreError::Conflict(msg));
            }
        }
        for (id, staged) in &self.products {
            let product = staged.value();
            if matches!(staged, Staged::Insert(_)) && tables.products.contains_key(id) {
                return Err(StoreError::Conflict(format!("product {id} already exists")));
            }
            let clash = tables.products.values().any(|other| {
                other.id_typed() != id
                    && other.name() == product.name()
                    && !self.products.contains_key(other.id_typed())
            });
            if clash {
                return Err(StoreError::Conflict(format!(
                    "product with name '{}' already exists",
                    product.name()
                )));
            }
        }
        for (key, staged) in &self.inventory {
            if matches!(staged, Staged::Insert(_)) && tables.inventory.contains_key(key) {
                return Err(StoreError::Conflict(format!(
                    "product {} is already stocked by shop {}",
                    key.1, key.0
                )));
            }
        }

        for shop in std::mem::take(&mut self.shops) {
            tables.shops.insert(shop.store_id.clone(), shop);
        }
        for (id, staged) in std::mem::take(&mut self.products) {
            let (Staged::Insert(product) | Staged::Update(product)) = staged;
            tables.products.insert(id, product);
        }
        for (key, staged) in std::mem::take(&mut self.inventory) {
            let (Staged::Insert(row) | Staged::Update(row)) = staged;
            tables.inventory.insert(key, row);
        }
        tables.sales.append(&mut self.sales);

        // Row guards in `self.held` are released on drop, after the new
        // quantities are visible.
        Ok(())
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        let keys: Vec<RowKey> = self.held.drain().map(|(key, _guard)| key).collect();
        self.shared.release_row_locks(&keys);
    }
}

fn shop_conflict<'a>(mut existing: impl Iterator<Item = &'a Shop>, shop: &Shop) -> Option<String> {
    existing.find_map(|other| {
        if other.store_id == shop.store_id {
            return Some(format!("shop {} already exists", shop.store_id));
        }
        match (&other.business_verification_id, &shop.business_verification_id) {
            (Some(a), Some(b)) if a == b => Some(format!(
                "business verification id '{b}' is already registered"
            )),
            _ => None,
        }
    })
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn shop(&mut self, store_id: &StoreId) -> StoreResult<Option<Shop>> {
        self.visible_shop(store_id)
    }

    async fn insert_shop(&mut self, shop: &Shop) -> StoreResult<()> {
        let committed = shop_conflict(self.shared.read()?.shops.values(), shop);
        if let Some(msg) = committed.or_else(|| shop_conflict(self.shops.iter(), shop)) {
            return Err(StoreError::Conflict(msg));
        }
        self.shops.push(shop.clone());
        Ok(())
    }

    async fn product(&mut self, product_id: &ProductId) -> StoreResult<Option<Product>> {
        self.visible_product(product_id)
    }

    async fn product_by_name(&mut self, name: &str) -> StoreResult<Option<Product>> {
        self.visible_product_by_name(name)
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        let id = product.id_typed();
        if self.visible_product(id)?.is_some() {
            return Err(StoreError::Conflict(format!("product {id} already exists")));
        }
        if self.name_taken_by_other(product)? {
            return Err(StoreError::Conflict(format!(
                "product with name '{}' already exists",
                product.name()
            )));
        }
        self.products
            .insert(id.clone(), Staged::Insert(product.clone()));
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<()> {
        let id = product.id_typed();
        if self.visible_product(id)?.is_none() {
            return Err(StoreError::Backend(format!("update of unknown product {id}")));
        }
        if self.name_taken_by_other(product)? {
            return Err(StoreError::Conflict(format!(
                "product with name '{}' already exists",
                product.name()
            )));
        }
        match self.products.get_mut(id) {
            Some(staged) => staged.replace(product.clone()),
            None => {
                self.products
                    .insert(id.clone(), Staged::Update(product.clone()));
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(store_id = %store_id, product_id = %product_id), err)]
    async fn lock_inventory(
        &mut self,
        store_id: &StoreId,
        product_id: &ProductId,
    ) -> StoreResult<Option<InventoryRow>> {
        let key = (store_id.clone(), product_id.clone());
        if !self.held.contains_key(&key) {
            let cell = self.shared.row_lock(&key)?;
            let acquired = tokio::time::timeout(self.lock_timeout, cell.lock_owned()).await;
            match acquired {
                Ok(guard) => {
                    self.held.insert(key.clone(), guard);
                }
                Err(_) => {
                    self.shared.release_row_locks([&key]);
                    return Err(StoreError::Contention(format!(
                        "timed out after {:?} waiting for inventory row {store_id}/{product_id}",
                        self.lock_timeout
                    )));
                }
            }
        }
        self.visible_row(&key)
    }

    async fn insert_inventory(&mut self, row: &InventoryRow) -> StoreResult<()> {
        let key = (row.store_id().clone(), row.product_id().clone());
        if self.visible_row(&key)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "product {} is already stocked by shop {}",
                key.1, key.0
            )));
        }
        self.inventory.insert(key, Staged::Insert(row.clone()));
        Ok(())
    }

    async fn update_stock(&mut self, row: &InventoryRow) -> StoreResult<()> {
        let key = (row.store_id().clone(), row.product_id().clone());
        match self.inventory.get_mut(&key) {
            Some(staged) => staged.replace(row.clone()),
            None if self.held.contains_key(&key) => {
                self.inventory.insert(key, Staged::Update(row.clone()));
            }
            None => {
                return Err(StoreError::Backend(format!(
                    "inventory row {}/{} updated without holding its lock",
                    key.0, key.1
                )));
            }
        }
        Ok(())
    }

    async fn append_sale(&mut self, record: &SaleRecord) -> StoreResult<()> {
        self.sales.push(record.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.publish()
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        drop(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use inventrack_core::Money;
    use inventrack_inventory::RegisterShop;
    use inventrack_products::{CreateProduct, Pricing};

    fn test_shop(id: &str) -> Shop {
        Shop::register(RegisterShop {
            store_id: Some(StoreId::parse(id).unwrap()),
            shop_name: format!("Shop {id}"),
            business_verification_id: Some(format!("GST-{id}")),
            address: "1 Main Street".to_string(),
            city: "Pune".to_string(),
            owner_name: "Owner".to_string(),
            owner_email: "owner@example.com".to_string(),
            ..RegisterShop::default()
        })
        .unwrap()
    }

    fn test_product(id: &str, name: &str) -> Product {
        Product::create(CreateProduct {
            product_id: ProductId::parse(id).unwrap(),
            name: name.to_string(),
            category: "Grocery".to_string(),
            pricing: Pricing::new(Money::from_minor(1_200), Money::from_minor(1_000)).unwrap(),
        })
        .unwrap()
    }

    fn key(store: &str, product: &str) -> (StoreId, ProductId) {
        (StoreId::parse(store).unwrap(), ProductId::parse(product).unwrap())
    }

    async fn seeded(lock_timeout: Duration) -> InMemoryInventoryStore {
        let store = InMemoryInventoryStore::with_lock_timeout(lock_timeout);
        let mut uow = store.begin().await.unwrap();
        uow.insert_shop(&test_shop("S1")).await.unwrap();
        uow.insert_product(&test_product("P1", "Rice")).await.unwrap();
        let (s, p) = key("S1", "P1");
        uow.insert_inventory(&InventoryRow::open(s, p, 10, Utc::now()).unwrap())
            .await
            .unwrap();
        uow.commit().await.unwrap();
        store
    }

    async fn committed_stock(store: &InMemoryInventoryStore) -> i64 {
        store.list_inventory(&StoreId::parse("S1").unwrap()).await.unwrap()[0].stock_quantity
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let store = seeded(DEFAULT_LOCK_TIMEOUT).await;
        let (s, p) = key("S1", "P1");

        let mut uow = store.begin().await.unwrap();
        let mut row = uow.lock_inventory(&s, &p).await.unwrap().unwrap();
        row.deduct(4, Utc::now()).unwrap();
        uow.update_stock(&row).await.unwrap();

        assert_eq!(committed_stock(&store).await, 10);
        assert_eq!(uow.lock_inventory(&s, &p).await.unwrap().unwrap().stock_quantity(), 6);

        uow.commit().await.unwrap();
        assert_eq!(committed_stock(&store).await, 6);
    }

    #[tokio::test]
    async fn dropping_a_unit_of_work_discards_its_writes_and_locks() {
        let store = seeded(Duration::from_millis(200)).await;
        let (s, p) = key("S1", "P1");

        {
            let mut uow = store.begin().await.unwrap();
            let mut row = uow.lock_inventory(&s, &p).await.unwrap().unwrap();
            row.deduct(10, Utc::now()).unwrap();
            uow.update_stock(&row).await.unwrap();
        }

        let mut next = store.begin().await.unwrap();
        let row = next.lock_inventory(&s, &p).await.unwrap().unwrap();
        assert_eq!(row.stock_quantity(), 10);
    }

    #[tokio::test]
    async fn second_locker_times_out_with_contention() {
        let store = seeded(Duration::from_millis(50)).await;
        let (s, p) = key("S1", "P1");

        let mut first = store.begin().await.unwrap();
        first.lock_inventory(&s, &p).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second.lock_inventory(&s, &p).await.unwrap_err();
        assert!(matches!(err, StoreError::Contention(_)));

        first.rollback().await.unwrap();
        assert!(second.lock_inventory(&s, &p).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn row_lock_cells_are_dropped_once_released() {
        let store = seeded(Duration::from_millis(50)).await;
        let s = StoreId::parse("S1").unwrap();

        for i in 0..200 {
            let ghost = ProductId::parse(format!("PGHOST{i}")).unwrap();
            let mut uow = store.begin().await.unwrap();
            assert!(uow.lock_inventory(&s, &ghost).await.unwrap().is_none());
            uow.rollback().await.unwrap();
        }
        assert_eq!(store.row_lock_cells(), 0);

        let (s, p) = key("S1", "P1");
        let mut first = store.begin().await.unwrap();
        first.lock_inventory(&s, &p).await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(second.lock_inventory(&s, &p).await.is_err());
        assert_eq!(store.row_lock_cells(), 1);

        first.commit().await.unwrap();
        drop(second);
        assert_eq!(store.row_lock_cells(), 0);
    }

    #[tokio::test]
    async fn duplicate_product_names_conflict() {
        let store = seeded(DEFAULT_LOCK_TIMEOUT).await;
        let mut uow = store.begin().await.unwrap();
        let err = uow
            .insert_product(&test_product("P2", "Rice"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_inserts_of_same_shop_conflict_at_commit() {
        let store = InMemoryInventoryStore::new();
        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();
        a.insert_shop(&test_shop("S9")).await.unwrap();
        b.insert_shop(&test_shop("S9")).await.unwrap();

        a.commit().await.unwrap();
        assert!(matches!(b.commit().await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_stock_requires_a_lock() {
        let store = seeded(DEFAULT_LOCK_TIMEOUT).await;
        let (s, p) = key("S1", "P1");
        let mut uow = store.begin().await.unwrap();
        let row = InventoryRow::restore(s, p, 3, None);
        assert!(matches!(
            uow.update_stock(&row).await,
            Err(StoreError::Backend(_))
        ));
    }
}
