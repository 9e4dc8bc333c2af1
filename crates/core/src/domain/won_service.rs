use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Renewal classification that is never eligible for commission.
pub const EARLY_RENEWAL: &str = "Early Renewal";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WonServiceId(pub String);

impl WonServiceId {
    /// Accepts a CRM record GUID, with or without surrounding braces.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim().trim_start_matches('{').trim_end_matches('}');
        if trimmed.is_empty() {
            return Err(DomainError::InvalidWonServiceId(raw.to_string()));
        }

        Uuid::parse_str(trimmed)
            .map(|guid| Self(guid.hyphenated().to_string()))
            .map_err(|_| DomainError::InvalidWonServiceId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WonServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueType {
    New,
    NetNew,
    Upsell,
    Renewal,
}

impl RevenueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::NetNew => "net_new",
            Self::Upsell => "upsell",
            Self::Renewal => "renewal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "new" => Some(Self::New),
            "net_new" | "netnew" => Some(Self::NetNew),
            "upsell" => Some(Self::Upsell),
            "renewal" => Some(Self::Renewal),
            _ => None,
        }
    }

    pub fn is_expansion(&self) -> bool {
        matches!(self, Self::Upsell | Self::Renewal)
    }

    pub fn is_new_business(&self) -> bool {
        matches!(self, Self::New | Self::NetNew)
    }
}

/// Snapshot of a closed service line as read from CRM.
///
/// `revenue_type` is `None` when the CRM carries no type or a code this
/// service does not recognise; such records earn no compensation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WonService {
    pub revenue_type: Option<RevenueType>,
    pub renewal_type: Option<String>,
    pub mrr_uptick: Option<Decimal>,
    pub tcv: Decimal,
    pub line_margin: Decimal,
    pub term: i32,
    pub mrr: Decimal,
}

impl WonService {
    /// Contract terms are counted in whole months and cannot run backwards.
    pub fn check_term(term: i32) -> Result<i32, DomainError> {
        if term < 0 {
            return Err(DomainError::NegativeTerm(term));
        }
        Ok(term)
    }

    pub fn is_early_renewal(&self) -> bool {
        self.renewal_type.as_deref() == Some(EARLY_RENEWAL)
    }

    /// Uptick only counts when it is strictly positive.
    pub fn positive_uptick(&self) -> Option<Decimal> {
        self.mrr_uptick.filter(|uptick| *uptick > Decimal::ZERO)
    }

    /// Line margin on the 0-100 scale; `None` when the fraction is too large to scale.
    pub fn margin_percent(&self) -> Option<Decimal> {
        self.line_margin.checked_mul(Decimal::ONE_HUNDRED)
    }
}
