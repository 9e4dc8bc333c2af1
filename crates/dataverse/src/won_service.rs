use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use wincomp_core::{CompUpdate, WonService, WonServiceId, WonServiceSnapshot, WonServiceStore};

use crate::client::DataverseClient;
use crate::error::DataverseError;
use crate::option_sets::revenue_type_from_code;

/// Logical column names on the won service table.
pub mod fields {
    pub const REVENUE_TYPE: &str = "cr_revenuetype";
    pub const RENEWAL_TYPE: &str = "cr_renewaltype";
    pub const MRR_UPTICK: &str = "cr_mrruptick";
    pub const TCV: &str = "cr_tcv";
    pub const LINE_MARGIN: &str = "cr_linemargin";
    pub const TERM: &str = "cr_term";
    pub const MRR: &str = "cr_mrr";
    pub const EXPECTED_COMP: &str = "cr_expectedcomp";
    pub const COMP_EXPLANATION: &str = "cr_compexplanation";
}

const FORMATTED_VALUE_SUFFIX: &str = "@OData.Community.Display.V1.FormattedValue";

const SELECT_FIELDS: [&str; 9] = [
    fields::REVENUE_TYPE,
    fields::RENEWAL_TYPE,
    fields::MRR_UPTICK,
    fields::TCV,
    fields::LINE_MARGIN,
    fields::TERM,
    fields::MRR,
    fields::EXPECTED_COMP,
    fields::COMP_EXPLANATION,
];

pub struct DataverseWonServiceStore {
    client: DataverseClient,
    entity_set: String,
}

impl DataverseWonServiceStore {
    pub fn new(client: DataverseClient, entity_set: impl Into<String>) -> Self {
        Self { client, entity_set: entity_set.into() }
    }
}

#[async_trait]
impl WonServiceStore for DataverseWonServiceStore {
    type Error = DataverseError;

    async fn fetch(&self, id: &WonServiceId) -> Result<WonServiceSnapshot, DataverseError> {
        let raw = self.client.get_record(&self.entity_set, id.as_str(), &SELECT_FIELDS).await?;
        let service = decode_won_service(&raw)?;
        Ok(WonServiceSnapshot { service, raw })
    }

    async fn persist(&self, id: &WonServiceId, update: &CompUpdate) -> Result<(), DataverseError> {
        self.client.patch_record(&self.entity_set, id.as_str(), &encode_comp_update(update)?).await
    }
}

/// Reads a won service row. Numeric columns the calculation needs must be
/// present; a missing uptick or renewal type is allowed.
pub fn decode_won_service(raw: &Value) -> Result<WonService, DataverseError> {
    let record = raw.as_object().ok_or_else(|| {
        DataverseError::Decode("won service payload is not an object".to_string())
    })?;

    let revenue_type = match record.get(fields::REVENUE_TYPE) {
        None | Some(Value::Null) => None,
        Some(value) => {
            let code = value.as_i64().ok_or_else(|| {
                DataverseError::Decode(format!(
                    "`{}` must be an option-set code",
                    fields::REVENUE_TYPE
                ))
            })?;
            revenue_type_from_code(code)
        }
    };

    let term = required(record, fields::TERM)?
        .as_i64()
        .and_then(|term| i32::try_from(term).ok())
        .ok_or_else(|| {
            DataverseError::Decode(format!("`{}` must be a whole number of months", fields::TERM))
        })
        .and_then(|term| {
            WonService::check_term(term)
                .map_err(|error| DataverseError::Decode(format!("`{}`: {error}", fields::TERM)))
        })?;

    Ok(WonService {
        revenue_type,
        renewal_type: renewal_type(record),
        mrr_uptick: optional_decimal(record, fields::MRR_UPTICK)?,
        tcv: required_decimal(record, fields::TCV)?,
        line_margin: required_decimal(record, fields::LINE_MARGIN)?,
        term,
        mrr: required_decimal(record, fields::MRR)?,
    })
}

pub fn encode_comp_update(update: &CompUpdate) -> Result<Value, DataverseError> {
    let total = update.total_comp.to_f64().ok_or_else(|| {
        DataverseError::Decode(format!(
            "total comp {} does not fit a currency column",
            update.total_comp
        ))
    })?;

    Ok(json!({
        (fields::EXPECTED_COMP): total,
        (fields::COMP_EXPLANATION): update.explanation,
    }))
}

/// Prefers the option-set label when the column is a choice, otherwise the
/// text value.
fn renewal_type(record: &Map<String, Value>) -> Option<String> {
    let formatted = format!("{}{FORMATTED_VALUE_SUFFIX}", fields::RENEWAL_TYPE);
    record
        .get(&formatted)
        .and_then(Value::as_str)
        .or_else(|| record.get(fields::RENEWAL_TYPE).and_then(Value::as_str))
        .map(str::to_string)
}

fn required<'a>(record: &'a Map<String, Value>, field: &str) -> Result<&'a Value, DataverseError> {
    match record.get(field) {
        None | Some(Value::Null) => {
            Err(DataverseError::Decode(format!("missing required field `{field}`")))
        }
        Some(value) => Ok(value),
    }
}

fn required_decimal(record: &Map<String, Value>, field: &str) -> Result<Decimal, DataverseError> {
    to_decimal(required(record, field)?, field)
}

fn optional_decimal(
    record: &Map<String, Value>,
    field: &str,
) -> Result<Option<Decimal>, DataverseError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => to_decimal(value, field).map(Some),
    }
}

fn to_decimal(value: &Value, field: &str) -> Result<Decimal, DataverseError> {
    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        _ => String::new(),
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| DataverseError::Decode(format!("`{field}` is not a decimal value")))
}
