//! Bulk stock import from CSV.
//!
//! Parsing is lenient per row (bad rows are counted and skipped) but strict
//! about the header: without `product_name` and `stock_quantity` columns no
//! row could ever apply.

use inventrack_core::{DomainError, DomainResult, Money};
use inventrack_products::Pricing;

const COL_NAME: &str = "product_name";
const COL_CATEGORY: &str = "category";
const COL_MRP: &str = "mrp";
const COL_MSP: &str = "msp";
const COL_STOCK: &str = "stock_quantity";

/// Catalog fields needed when the row introduces an unknown product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProductDetails {
    pub category: String,
    pub pricing: Pricing,
}

/// One usable CSV row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub product_name: String,
    pub stock_quantity: i64,
    /// `None` when category/mrp/msp are missing or invalid; such a row can
    /// only top up an existing product.
    pub details: Option<NewProductDetails>,
}

/// Parsed upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockImport {
    pub rows: Vec<ImportRow>,
    pub skipped: usize,
}

struct Columns {
    name: usize,
    stock: usize,
    category: Option<usize>,
    mrp: Option<usize>,
    msp: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> DomainResult<Self> {
        let find = |col: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(col))
        };
        let name = find(COL_NAME)
            .ok_or_else(|| DomainError::validation(format!("csv header is missing '{COL_NAME}'")))?;
        let stock = find(COL_STOCK)
            .ok_or_else(|| DomainError::validation(format!("csv header is missing '{COL_STOCK}'")))?;
        Ok(Self {
            name,
            stock,
            category: find(COL_CATEGORY),
            mrp: find(COL_MRP),
            msp: find(COL_MSP),
        })
    }
}

/// Parse an uploaded CSV document.
pub fn parse_stock_csv(text: &str) -> DomainResult<StockImport> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| DomainError::validation(format!("unreadable csv header: {e}")))?
        .clone();
    let cols = Columns::from_headers(&headers)?;

    let mut import = StockImport::default();
    for record in reader.records() {
        match record.ok().and_then(|r| parse_row(&r, &cols)) {
            Some(row) => import.rows.push(row),
            None => import.skipped += 1,
        }
    }
    Ok(import)
}

fn parse_row(record: &csv::StringRecord, cols: &Columns) -> Option<ImportRow> {
    let product_name = record.get(cols.name)?.trim();
    if product_name.is_empty() {
        return None;
    }
    let stock_quantity: i64 = record.get(cols.stock)?.trim().parse().ok()?;
    if stock_quantity < 0 {
        return None;
    }

    Some(ImportRow {
        product_name: product_name.to_string(),
        stock_quantity,
        details: parse_details(record, cols),
    })
}

fn parse_details(record: &csv::StringRecord, cols: &Columns) -> Option<NewProductDetails> {
    let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::trim);

    let category = field(cols.category).filter(|c| !c.is_empty())?;
    let mrp = field(cols.mrp)?.parse::<f64>().ok()?;
    let msp = field(cols.msp)?.parse::<f64>().ok()?;
    let pricing = Pricing::new(Money::from_decimal(mrp).ok()?, Money::from_decimal(msp).ok()?).ok()?;

    Some(NewProductDetails {
        category: category.to_string(),
        pricing,
    })
}
