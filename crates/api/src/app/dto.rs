use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use inventrack_core::{DomainResult, Money, ProductId, StoreId};
use inventrack_infra::store::StockedProduct;
use inventrack_infra::{ImportSummary, NewStockedProduct, ProductEdit};
use inventrack_inventory::{RegisterShop, Shop};
use inventrack_products::{Pricing, UpdateProduct};
use inventrack_sales::{KpiTotals, ProcessSale, SaleLine, SaleReceipt, SalesAnalytics};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterShopRequest {
    pub store_id: Option<String>,
    pub shop_name: String,
    pub business_verification_id: Option<String>,
    pub address: String,
    pub city: String,
    pub shop_phone: Option<String>,
    pub store_type: Option<String>,
    pub owner_name: String,
    pub owner_email: String,
}

impl RegisterShopRequest {
    pub fn into_command(self) -> DomainResult<RegisterShop> {
        let store_id = match self.store_id.filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(StoreId::parse(raw)?),
            None => None,
        };
        Ok(RegisterShop {
            store_id,
            shop_name: self.shop_name,
            business_verification_id: self.business_verification_id,
            address: self.address,
            city: self.city,
            shop_phone: self.shop_phone,
            store_type: self.store_type,
            owner_name: self.owner_name,
            owner_email: self.owner_email,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub product_name: String,
    pub category: String,
    pub mrp: f64,
    pub msp: f64,
    #[serde(default)]
    pub stock_quantity: i64,
}

impl CreateProductRequest {
    pub fn into_command(self) -> DomainResult<NewStockedProduct> {
        Ok(NewStockedProduct {
            name: self.product_name,
            category: self.category,
            pricing: Pricing::new(Money::from_decimal(self.mrp)?, Money::from_decimal(self.msp)?)?,
            stock_quantity: self.stock_quantity,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub mrp: Option<f64>,
    pub msp: Option<f64>,
    pub stock_quantity: Option<i64>,
}

impl UpdateProductRequest {
    pub fn into_edit(self) -> DomainResult<ProductEdit> {
        Ok(ProductEdit {
            patch: UpdateProduct {
                name: self.product_name,
                category: self.category,
                mrp: self.mrp.map(Money::from_decimal).transpose()?,
                msp: self.msp.map(Money::from_decimal).transpose()?,
            },
            stock_quantity: self.stock_quantity,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SaleItemRequest {
    pub product_id: String,
    pub quantity_sold: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProcessSaleRequest {
    pub store_id: String,
    pub items: Vec<SaleItemRequest>,
    pub total_amount: f64,
}

impl ProcessSaleRequest {
    pub fn into_command(self) -> DomainResult<ProcessSale> {
        let lines = self
            .items
            .into_iter()
            .map(|item| -> DomainResult<SaleLine> {
                Ok(SaleLine {
                    product_id: ProductId::parse(item.product_id)?,
                    quantity: item.quantity_sold,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(ProcessSale {
            store_id: StoreId::parse(self.store_id)?,
            lines,
            declared_total: self.total_amount,
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct ShopResponse {
    pub store_id: String,
    pub shop_name: String,
    pub business_verification_id: Option<String>,
    pub address: String,
    pub city: String,
    pub shop_phone: Option<String>,
    pub store_type: Option<String>,
    pub status: String,
    pub owner_name: String,
    pub owner_email: String,
}

impl From<Shop> for ShopResponse {
    fn from(shop: Shop) -> Self {
        Self {
            store_id: shop.store_id.to_string(),
            shop_name: shop.shop_name,
            business_verification_id: shop.business_verification_id,
            address: shop.address,
            city: shop.city,
            shop_phone: shop.shop_phone,
            store_type: shop.store_type,
            status: shop.status,
            owner_name: shop.owner_name,
            owner_email: shop.owner_email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub mrp: f64,
    pub msp: f64,
    pub stock_quantity: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<StockedProduct> for ProductResponse {
    fn from(s: StockedProduct) -> Self {
        let pricing = s.product.pricing();
        Self {
            product_id: s.product.id_typed().to_string(),
            product_name: s.product.name().to_string(),
            category: s.product.category().to_string(),
            mrp: pricing.mrp.to_decimal(),
            msp: pricing.msp.to_decimal(),
            stock_quantity: s.stock_quantity,
            last_updated: s.last_updated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SaleResponse {
    pub message: &'static str,
    pub total_items_sold: usize,
    pub store_id: String,
    pub total_amount: f64,
}

impl From<SaleReceipt> for SaleResponse {
    fn from(receipt: SaleReceipt) -> Self {
        Self {
            message: "Sale successfully processed and inventory updated.",
            total_items_sold: receipt.items_processed,
            store_id: receipt.store_id.to_string(),
            total_amount: receipt.declared_total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub shop_id: String,
    pub new_products_created: usize,
    pub existing_products_updated: usize,
    pub rows_skipped: usize,
}

impl UploadResponse {
    pub fn new(store_id: &StoreId, summary: ImportSummary) -> Self {
        Self {
            message: "Inventory upload complete.",
            shop_id: store_id.to_string(),
            new_products_created: summary.created,
            existing_products_updated: summary.updated,
            rows_skipped: summary.skipped,
        }
    }
}

/// A number with its display unit, e.g. `{"value": 30.0, "unit": "INR"}`.
#[derive(Debug, Serialize, PartialEq)]
pub struct Metric {
    pub value: f64,
    pub unit: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct KpiBlock {
    pub total_sales_count: Metric,
    pub total_revenue_inr: Metric,
    pub total_units_sold: Metric,
}

impl From<&KpiTotals> for KpiBlock {
    fn from(t: &KpiTotals) -> Self {
        Self {
            total_sales_count: Metric {
                value: t.sales_count as f64,
                unit: "Count",
            },
            total_revenue_inr: Metric {
                value: t.revenue.to_decimal(),
                unit: "INR",
            },
            total_units_sold: Metric {
                value: t.units_sold as f64,
                unit: "Units",
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrendPointResponse {
    pub date: NaiveDate,
    pub total_revenue_inr: f64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub store_id: String,
    pub kpis_daily: KpiBlock,
    pub kpis_weekly: KpiBlock,
    pub kpis_monthly: KpiBlock,
    pub kpis_overall: KpiBlock,
    pub sales_trend_data: Vec<TrendPointResponse>,
}

impl From<SalesAnalytics> for AnalyticsResponse {
    fn from(report: SalesAnalytics) -> Self {
        Self {
            store_id: report.store_id.to_string(),
            kpis_daily: (&report.kpis.daily).into(),
            kpis_weekly: (&report.kpis.weekly).into(),
            kpis_monthly: (&report.kpis.monthly).into(),
            kpis_overall: (&report.kpis.overall).into(),
            sales_trend_data: report
                .trend
                .into_iter()
                .map(|p| TrendPointResponse {
                    date: p.date,
                    total_revenue_inr: p.revenue.to_decimal(),
                })
                .collect(),
        }
    }
}
