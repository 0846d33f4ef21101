// src/store.rs

use crate::schema::{Customer, ExtractedBatch, Invoice, Product};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

/// In-memory state shared with whoever displays the records.
///
/// The three collections only ever grow, in insertion order. Readers get
/// slices; mutation goes through the append methods below, which only the
/// upload pipeline calls.
#[derive(Debug, Default, Serialize)]
pub struct RecordStore {
    invoices: Vec<Invoice>,
    customers: Vec<Customer>,
    products: Vec<Product>,
    error: Option<String>,
    #[serde(skip)]
    last_stamp: Option<i64>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoices(&self) -> &[Invoice] {
        &self.invoices
    }

    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Message of the last failed upload, if no upload has succeeded since.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Products dispatched in the same batch as `invoice`.
    pub fn products_for<'a>(
        &'a self,
        invoice: &Invoice,
    ) -> impl Iterator<Item = &'a Product> + use<'a> {
        let prefix = invoice
            .id
            .strip_prefix("inv_")
            .map(|stamp| format!("prod_{stamp}_"));
        self.products
            .iter()
            .filter(move |p| prefix.as_deref().is_some_and(|pre| p.id.starts_with(pre)))
    }

    pub(crate) fn append_invoice(&mut self, invoice: Invoice) {
        self.invoices.push(invoice);
    }

    pub(crate) fn append_customer(&mut self, customer: Customer) {
        self.customers.push(customer);
    }

    pub(crate) fn append_product(&mut self, product: Product) {
        self.products.push(product);
    }

    pub(crate) fn set_error(&mut self, message: String) {
        self.error = Some(message);
    }

    pub(crate) fn clear_error(&mut self) {
        self.error = None;
    }

    /// Stamp for a new batch: `now_ms`, bumped past the previous stamp if the
    /// clock hasn't moved on, so identifiers never repeat within this store.
    fn next_stamp(&mut self, now_ms: i64) -> i64 {
        let stamp = match self.last_stamp {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Assign identifiers to a validated batch and append it to the store:
/// products first, then the invoice, then the customer. Returns the batch stamp.
pub fn dispatch(batch: ExtractedBatch, now_ms: i64, store: &mut RecordStore) -> i64 {
    let stamp = store.next_stamp(now_ms);
    let ExtractedBatch {
        mut invoice,
        mut customer,
        products,
    } = batch;

    let product_count = products.len();
    for (index, mut product) in products.into_iter().enumerate() {
        product.id = format!("prod_{stamp}_{index}");
        store.append_product(product);
    }

    invoice.id = format!("inv_{stamp}");
    customer.id = format!("cust_{stamp}");
    info!(
        invoice = %invoice.id,
        serial = %invoice.serial_number,
        customer = %customer.name,
        products = product_count,
        "Dispatched batch"
    );
    store.append_invoice(invoice);
    store.append_customer(customer);

    stamp
}
