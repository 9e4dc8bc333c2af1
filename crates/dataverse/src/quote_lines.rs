use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::client::DataverseClient;
use crate::error::DataverseError;

/// A quote detail row to create under an existing quote.
///
/// Either `product_id` (catalog product) or `description` (write-in product)
/// must be given.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuoteLineItem {
    pub quote_id: String,
    pub product_id: Option<String>,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub price_per_unit: Decimal,
}

impl NewQuoteLineItem {
    pub fn validate(&self) -> Result<(), String> {
        Uuid::parse_str(self.quote_id.trim()).map_err(|_| "quoteId must be a GUID".to_string())?;

        if let Some(product_id) = &self.product_id {
            Uuid::parse_str(product_id.trim())
                .map_err(|_| "productId must be a GUID".to_string())?;
        } else if self.description.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            return Err("either productId or description is required".to_string());
        }

        if self.quantity <= Decimal::ZERO {
            return Err("quantity must be greater than zero".to_string());
        }
        if self.price_per_unit < Decimal::ZERO {
            return Err("pricePerUnit must not be negative".to_string());
        }

        Ok(())
    }

    /// Dataverse `quotedetail` body with navigation bindings.
    pub fn to_record(&self) -> Result<Value, DataverseError> {
        let mut record = Map::new();
        record.insert(
            "quoteid@odata.bind".to_string(),
            format!("/quotes({})", self.quote_id.trim()).into(),
        );

        match (&self.product_id, &self.description) {
            (Some(product_id), _) => {
                record.insert(
                    "productid@odata.bind".to_string(),
                    format!("/products({})", product_id.trim()).into(),
                );
            }
            (None, description) => {
                record.insert("isproductoverridden".to_string(), true.into());
                record.insert(
                    "productdescription".to_string(),
                    description.clone().unwrap_or_default().into(),
                );
            }
        }

        record.insert("quantity".to_string(), number(self.quantity, "quantity")?);
        record.insert("ispriceoverridden".to_string(), true.into());
        record.insert("priceperunit".to_string(), number(self.price_per_unit, "pricePerUnit")?);

        Ok(Value::Object(record))
    }
}

pub async fn create_quote_line_item(
    client: &DataverseClient,
    entity_set: &str,
    item: &NewQuoteLineItem,
) -> Result<Value, DataverseError> {
    client.create_record(entity_set, &item.to_record()?).await
}

fn number(value: Decimal, field: &str) -> Result<Value, DataverseError> {
    value
        .to_f64()
        .map(Value::from)
        .ok_or_else(|| DataverseError::Decode(format!("`{field}` is out of range")))
}
