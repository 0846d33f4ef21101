// src/validate.rs

use crate::error::ValidationError;
use crate::schema::{
    AdditionalCharges, CHARGES_FIELDS, CUSTOMER_FIELDS, Customer, ExtractedBatch, FieldKind,
    FieldSpec, INVOICE_FIELDS, Invoice, PRODUCT_FIELDS, Product, TEXT_DEFAULT,
};
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Turn the parsed model response into a fully defaulted batch.
///
/// Every declared field ends up present: empty text fields become `"N/A"`,
/// empty numeric fields become `"0.00"`. The whole batch is rejected when
/// `products` is missing, not an array, or empty. Pure function of its input.
pub fn validate(data: &Value) -> Result<ExtractedBatch, ValidationError> {
    let invoice_group = group(data.get("invoice"), "invoice")?;
    let customer_group = group(data.get("customer"), "customer")?;
    let charges_group = group(invoice_group.get("additionalCharges"), "additionalCharges")?;

    let [
        serial_number,
        customer_name,
        product_name,
        total_amount,
        quantity,
        tax,
        date,
    ] = fill(invoice_group, &INVOICE_FIELDS);
    let [making_charges, debit_card_charges, shipping_charges, other_charges] =
        fill(charges_group, &CHARGES_FIELDS);
    let mut invoice = Invoice {
        id: String::new(),
        serial_number,
        customer_name,
        product_name,
        total_amount,
        quantity,
        tax,
        date,
        additional_charges: AdditionalCharges {
            making_charges,
            debit_card_charges,
            shipping_charges,
            other_charges,
        },
    };

    let [name, phone_number, total_purchase_amount] = fill(customer_group, &CUSTOMER_FIELDS);
    let customer = Customer {
        id: String::new(),
        name,
        phone_number,
        total_purchase_amount,
    };

    let entries = match data.get("products") {
        Some(Value::Array(entries)) if !entries.is_empty() => entries,
        _ => return Err(ValidationError::ProductsMissing),
    };
    let products = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let fields = entry
                .as_object()
                .ok_or(ValidationError::ProductNotObject(i))?;
            let [name, quantity, unit_price, discount, tax, price_with_tax] =
                fill(fields, &PRODUCT_FIELDS);
            Ok(Product {
                id: String::new(),
                name,
                quantity,
                unit_price,
                discount,
                tax,
                price_with_tax,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if invoice.product_name == TEXT_DEFAULT {
        invoice.product_name = products[0].name.clone();
    }

    Ok(ExtractedBatch {
        invoice,
        customer,
        products,
    })
}

static EMPTY: LazyLock<Map<String, Value>> = LazyLock::new(Map::new);

/// Absent, null or blank groups are treated as empty; anything else must be
/// an object.
fn group<'a>(
    value: Option<&'a Value>,
    name: &'static str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(&*EMPTY),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(&*EMPTY),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(ValidationError::GroupNotObject(name)),
    }
}

fn fill<const N: usize>(group: &Map<String, Value>, fields: &[FieldSpec; N]) -> [String; N] {
    std::array::from_fn(|i| field_value(group.get(fields[i].key), fields[i].kind))
}

fn field_value(value: Option<&Value>, kind: FieldKind) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        // null, empty strings, and nested values the schema doesn't expect
        _ => kind.default_value().to_string(),
    }
}
