// src/schema.rs

use serde::Serialize;

/// Placeholder for a text field the model left empty.
pub const TEXT_DEFAULT: &str = "N/A";
/// Placeholder for a numeric field the model left empty.
pub const NUMERIC_DEFAULT: &str = "0.00";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Numeric,
}

impl FieldKind {
    pub fn default_value(self) -> &'static str {
        match self {
            FieldKind::Text => TEXT_DEFAULT,
            FieldKind::Numeric => NUMERIC_DEFAULT,
        }
    }
}

/// One declared field of a record group, keyed by its JSON name.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
}

const fn text(key: &'static str) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Text }
}

const fn numeric(key: &'static str) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Numeric }
}

// Order matches the struct field order below; the validator relies on it.

pub const INVOICE_FIELDS: [FieldSpec; 7] = [
    text("serialNumber"),
    text("customerName"),
    text("productName"),
    numeric("totalAmount"),
    numeric("quantity"),
    numeric("tax"),
    text("date"),
];

pub const CHARGES_FIELDS: [FieldSpec; 4] = [
    numeric("makingCharges"),
    numeric("debitCardCharges"),
    numeric("shippingCharges"),
    numeric("otherCharges"),
];

pub const CUSTOMER_FIELDS: [FieldSpec; 3] = [
    text("name"),
    text("phoneNumber"),
    numeric("totalPurchaseAmount"),
];

pub const PRODUCT_FIELDS: [FieldSpec; 6] = [
    text("name"),
    numeric("quantity"),
    numeric("unitPrice"),
    numeric("discount"),
    numeric("tax"),
    numeric("priceWithTax"),
];

/// Extra charges listed on an invoice next to the products.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalCharges {
    pub making_charges: String,
    pub debit_card_charges: String,
    pub shipping_charges: String,
    pub other_charges: String,
}

impl AdditionalCharges {
    /// Sum of all four charges. Values that don't parse as numbers count as zero.
    pub fn total(&self) -> f64 {
        [
            &self.making_charges,
            &self.debit_card_charges,
            &self.shipping_charges,
            &self.other_charges,
        ]
        .iter()
        .map(|v| v.trim().parse::<f64>().unwrap_or(0.0))
        .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// `inv_<stamp>`, empty until dispatched.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub serial_number: String,
    pub customer_name: String,
    pub product_name: String,
    pub total_amount: String,
    pub quantity: String,
    pub tax: String,
    pub date: String,
    pub additional_charges: AdditionalCharges,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// `cust_<stamp>`, empty until dispatched.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub phone_number: String,
    pub total_purchase_amount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// `prod_<stamp>_<index>`, empty until dispatched.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub quantity: String,
    pub unit_price: String,
    pub discount: String,
    pub tax: String,
    pub price_with_tax: String,
}

/// Everything extracted from one upload: one invoice, one customer and at
/// least one product, with every field filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedBatch {
    pub invoice: Invoice,
    pub customer: Customer,
    pub products: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charges_total() {
        let charges = AdditionalCharges {
            making_charges: "10.50".to_string(),
            debit_card_charges: NUMERIC_DEFAULT.to_string(),
            shipping_charges: " 4.5 ".to_string(),
            other_charges: "n/a".to_string(),
        };
        assert!((charges.total() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_records_serialize_camel_case() {
        let product = Product {
            id: "prod_1_0".to_string(),
            name: "Widget".to_string(),
            quantity: "2".to_string(),
            unit_price: "50.00".to_string(),
            discount: NUMERIC_DEFAULT.to_string(),
            tax: NUMERIC_DEFAULT.to_string(),
            price_with_tax: NUMERIC_DEFAULT.to_string(),
        };
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["unitPrice"], "50.00");
        assert_eq!(json["priceWithTax"], "0.00");
        assert_eq!(json["id"], "prod_1_0");
    }

    #[test]
    fn test_unassigned_id_omitted() {
        let customer = Customer {
            id: String::new(),
            name: "Alice".to_string(),
            phone_number: TEXT_DEFAULT.to_string(),
            total_purchase_amount: NUMERIC_DEFAULT.to_string(),
        };
        let json = serde_json::to_value(&customer).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["phoneNumber"], "N/A");
    }
}
