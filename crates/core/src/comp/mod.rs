//! Won-service compensation.
//!
//! Classifies a revenue event and prices it against the margin tier table.
//! Everything in here is pure: callers own fetching the service snapshot and
//! persisting `total_comp` and `explanation` back to CRM.

pub mod format;
pub mod rates;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::won_service::{RevenueType, WonService};

use self::{
    format::{format_percent, format_usd},
    rates::{commission_rate, EXISTING_REVENUE_RATE},
};

pub const EARLY_RENEWAL_EXPLANATION: &str = "Early Renewal - No compensation";
pub const NO_MATCH_EXPLANATION: &str = "No matching compensation rules";
pub const OUT_OF_RANGE_EXPLANATION: &str = "Amounts out of range - No compensation";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompBreakdown {
    #[serde(rename = "existingMRR")]
    pub existing_mrr: Decimal,
    #[serde(rename = "existingTCV")]
    pub existing_tcv: Decimal,
    #[serde(rename = "existingRate")]
    pub existing_rate: Decimal,
    #[serde(rename = "existingComp")]
    pub existing_comp: Decimal,
    #[serde(rename = "newMRR")]
    pub new_mrr: Option<Decimal>,
    #[serde(rename = "newTCV")]
    pub new_tcv: Option<Decimal>,
    #[serde(rename = "newRate")]
    pub new_rate: Option<Decimal>,
    #[serde(rename = "newComp")]
    pub new_comp: Option<Decimal>,
    #[serde(rename = "totalComp")]
    pub total_comp: Decimal,
    pub explanation: String,
}

impl CompBreakdown {
    fn single_slice(
        mrr: Decimal,
        tcv: Decimal,
        rate: Decimal,
        comp: Decimal,
        explanation: String,
    ) -> Self {
        Self {
            existing_mrr: mrr,
            existing_tcv: tcv,
            existing_rate: rate,
            existing_comp: comp,
            new_mrr: None,
            new_tcv: None,
            new_rate: None,
            new_comp: None,
            total_comp: comp,
            explanation,
        }
    }

    fn zero(service: &WonService, explanation: &str) -> Self {
        Self::single_slice(
            service.mrr,
            service.tcv,
            Decimal::ZERO,
            Decimal::ZERO,
            explanation.to_string(),
        )
    }

    pub fn has_new_slice(&self) -> bool {
        self.new_comp.is_some()
    }
}

pub trait CompensationEngine: Send + Sync {
    fn calculate(&self, service: &WonService) -> CompBreakdown;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicCompensationEngine;

impl CompensationEngine for DeterministicCompensationEngine {
    fn calculate(&self, service: &WonService) -> CompBreakdown {
        calculate(service)
    }
}

/// Computes the compensation breakdown for one won service.
///
/// Branches are evaluated in priority order: expansion with a positive MRR
/// uptick, expansion without one, new business, then no match. Amounts whose
/// products fall outside `Decimal` range earn nothing.
pub fn calculate(service: &WonService) -> CompBreakdown {
    price(service).unwrap_or_else(|| CompBreakdown::zero(service, OUT_OF_RANGE_EXPLANATION))
}

fn price(service: &WonService) -> Option<CompBreakdown> {
    match (service.revenue_type, service.positive_uptick()) {
        (Some(revenue_type), Some(uptick)) if revenue_type.is_expansion() => {
            if revenue_type == RevenueType::Renewal && service.is_early_renewal() {
                return Some(CompBreakdown::zero(service, EARLY_RENEWAL_EXPLANATION));
            }
            split_uptick(service, uptick)
        }
        (Some(revenue_type), _) if revenue_type.is_expansion() => {
            if service.is_early_renewal() {
                return Some(CompBreakdown::zero(service, EARLY_RENEWAL_EXPLANATION));
            }
            let label = if revenue_type == RevenueType::Upsell {
                "Upsell (no uptick)"
            } else {
                "Regular Renewal"
            };
            let comp = service.tcv.checked_mul(EXISTING_REVENUE_RATE)?;
            Some(CompBreakdown::single_slice(
                service.mrr,
                service.tcv,
                EXISTING_REVENUE_RATE,
                comp,
                slice_line(label, service.mrr, service.term, EXISTING_REVENUE_RATE, comp),
            ))
        }
        (Some(revenue_type), _) if revenue_type.is_new_business() => {
            let rate = commission_rate(service.margin_percent()?);
            let comp = service.tcv.checked_mul(rate)?;
            Some(CompBreakdown::single_slice(
                service.mrr,
                service.tcv,
                rate,
                comp,
                slice_line("New/Net New", service.mrr, service.term, rate, comp),
            ))
        }
        _ => Some(CompBreakdown::zero(service, NO_MATCH_EXPLANATION)),
    }
}

fn split_uptick(service: &WonService, uptick: Decimal) -> Option<CompBreakdown> {
    let term = Decimal::from(service.term);

    let existing_mrr = service.mrr.checked_sub(uptick)?;
    let existing_tcv = existing_mrr.checked_mul(term)?;
    let existing_comp = existing_tcv.checked_mul(EXISTING_REVENUE_RATE)?;

    let new_tcv = uptick.checked_mul(term)?;
    let new_rate = commission_rate(service.margin_percent()?);
    let new_comp = new_tcv.checked_mul(new_rate)?;
    let total_comp = existing_comp.checked_add(new_comp)?;

    let explanation = format!(
        "{}\n{}",
        slice_line("Existing", existing_mrr, service.term, EXISTING_REVENUE_RATE, existing_comp),
        slice_line("New", uptick, service.term, new_rate, new_comp),
    );

    Some(CompBreakdown {
        existing_mrr,
        existing_tcv,
        existing_rate: EXISTING_REVENUE_RATE,
        existing_comp,
        new_mrr: Some(uptick),
        new_tcv: Some(new_tcv),
        new_rate: Some(new_rate),
        new_comp: Some(new_comp),
        total_comp,
        explanation,
    })
}

fn slice_line(label: &str, mrr: Decimal, term: i32, rate: Decimal, comp: Decimal) -> String {
    format!(
        "{label}: {}/mo * {term} months * {} = {}",
        format_usd(mrr),
        format_percent(rate),
        format_usd(comp)
    )
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::won_service::{RevenueType, WonService};

    use super::{
        calculate, CompBreakdown, CompensationEngine, DeterministicCompensationEngine,
        EARLY_RENEWAL_EXPLANATION, NO_MATCH_EXPLANATION, OUT_OF_RANGE_EXPLANATION,
    };

    fn service(revenue_type: Option<RevenueType>) -> WonService {
        WonService {
            revenue_type,
            renewal_type: None,
            mrr_uptick: None,
            tcv: Decimal::new(12_000, 0),
            line_margin: Decimal::new(25, 2),
            term: 12,
            mrr: Decimal::new(1_000, 0),
        }
    }

    fn assert_total_invariant(breakdown: &CompBreakdown) {
        assert_eq!(
            breakdown.total_comp,
            breakdown.existing_comp + breakdown.new_comp.unwrap_or(Decimal::ZERO),
            "total must equal existing + new for {breakdown:?}"
        );
    }

    #[test]
    fn new_business_uses_margin_tier() {
        let breakdown = calculate(&WonService {
            tcv: Decimal::new(10_000, 0),
            line_margin: Decimal::new(20, 2),
            ..service(Some(RevenueType::New))
        });

        assert_eq!(breakdown.existing_rate, Decimal::new(10, 2));
        assert_eq!(breakdown.total_comp, Decimal::new(1_000, 0));
        assert!(breakdown.explanation.starts_with("New/Net New:"));
        assert_eq!(
            breakdown.explanation,
            "New/Net New: $1,000.00/mo * 12 months * 10% = $1,000.00"
        );
        assert!(!breakdown.has_new_slice());
        assert_total_invariant(&breakdown);
    }

    #[test]
    fn net_new_is_priced_like_new() {
        let new = calculate(&service(Some(RevenueType::New)));
        let net_new = calculate(&service(Some(RevenueType::NetNew)));
        assert_eq!(new, net_new);
    }

    #[test]
    fn early_renewal_earns_nothing() {
        for uptick in [None, Some(Decimal::new(250, 0))] {
            let breakdown = calculate(&WonService {
                renewal_type: Some("Early Renewal".to_string()),
                mrr_uptick: uptick,
                tcv: Decimal::new(73_500, 0),
                ..service(Some(RevenueType::Renewal))
            });

            assert_eq!(breakdown.total_comp, Decimal::ZERO);
            assert_eq!(breakdown.explanation, EARLY_RENEWAL_EXPLANATION);
            assert_eq!(breakdown.existing_tcv, Decimal::new(73_500, 0));
            assert_eq!(breakdown.existing_rate, Decimal::ZERO);
            assert!(!breakdown.has_new_slice());
            assert_total_invariant(&breakdown);
        }
    }

    #[test]
    fn renewal_with_uptick_splits_existing_and_new() {
        let breakdown = calculate(&WonService {
            renewal_type: Some("Standard".to_string()),
            mrr: Decimal::new(1_000, 0),
            mrr_uptick: Some(Decimal::new(200, 0)),
            term: 12,
            line_margin: Decimal::new(30, 2),
            ..service(Some(RevenueType::Renewal))
        });

        assert_eq!(breakdown.existing_mrr, Decimal::new(800, 0));
        assert_eq!(breakdown.existing_tcv, Decimal::new(9_600, 0));
        assert_eq!(breakdown.existing_comp, Decimal::new(480, 0));
        assert_eq!(breakdown.new_mrr, Some(Decimal::new(200, 0)));
        assert_eq!(breakdown.new_tcv, Some(Decimal::new(2_400, 0)));
        assert_eq!(breakdown.new_rate, Some(Decimal::new(14, 2)));
        assert_eq!(breakdown.new_comp, Some(Decimal::new(336, 0)));
        assert_eq!(breakdown.total_comp, Decimal::new(816, 0));
        assert_eq!(
            breakdown.explanation,
            "Existing: $800.00/mo * 12 months * 5% = $480.00\n\
             New: $200.00/mo * 12 months * 14% = $336.00"
        );
        assert_total_invariant(&breakdown);
    }

    #[test]
    fn upsell_with_uptick_ignores_early_renewal_label() {
        let breakdown = calculate(&WonService {
            renewal_type: Some("Early Renewal".to_string()),
            mrr_uptick: Some(Decimal::new(100, 0)),
            ..service(Some(RevenueType::Upsell))
        });

        assert!(breakdown.has_new_slice());
        assert!(breakdown.explanation.starts_with("Existing:"));
        assert_total_invariant(&breakdown);
    }

    #[test]
    fn upsell_without_uptick_pays_flat_rate_on_tcv() {
        let breakdown = calculate(&WonService {
            mrr_uptick: None,
            tcv: Decimal::new(5_000, 0),
            ..service(Some(RevenueType::Upsell))
        });

        assert_eq!(breakdown.total_comp, Decimal::new(250, 0));
        assert!(breakdown.explanation.starts_with("Upsell (no uptick):"));
        assert!(!breakdown.has_new_slice());
        assert_total_invariant(&breakdown);
    }

    #[test]
    fn regular_renewal_with_zero_uptick_pays_flat_rate() {
        let breakdown = calculate(&WonService {
            renewal_type: Some("Standard".to_string()),
            mrr_uptick: Some(Decimal::ZERO),
            ..service(Some(RevenueType::Renewal))
        });

        assert_eq!(breakdown.total_comp, Decimal::new(600, 0));
        assert!(breakdown.explanation.starts_with("Regular Renewal:"));
        assert_total_invariant(&breakdown);
    }

    #[test]
    fn upsell_marked_early_renewal_without_uptick_earns_nothing() {
        let breakdown = calculate(&WonService {
            renewal_type: Some("Early Renewal".to_string()),
            ..service(Some(RevenueType::Upsell))
        });

        assert_eq!(breakdown.total_comp, Decimal::ZERO);
        assert_eq!(breakdown.explanation, EARLY_RENEWAL_EXPLANATION);
    }

    #[test]
    fn unrecognized_revenue_type_earns_nothing() {
        let breakdown = calculate(&service(None));

        assert_eq!(breakdown.total_comp, Decimal::ZERO);
        assert_eq!(breakdown.explanation, NO_MATCH_EXPLANATION);
        assert_total_invariant(&breakdown);
    }

    #[test]
    fn engine_is_idempotent() {
        let engine = DeterministicCompensationEngine;
        let input = WonService {
            mrr_uptick: Some(Decimal::new(33_333, 2)),
            line_margin: Decimal::new(4_725, 4),
            ..service(Some(RevenueType::Renewal))
        };

        let first = engine.calculate(&input);
        let second = engine.calculate(&input);
        assert_eq!(first, second);
        assert_eq!(first.explanation, second.explanation);
    }

    #[test]
    fn breakdown_serializes_with_crm_field_names() {
        let breakdown = calculate(&service(Some(RevenueType::New)));
        let json = serde_json::to_value(&breakdown).expect("serialize");

        assert!(json.get("existingMRR").is_some());
        assert!(json.get("totalComp").is_some());
        assert!(json["newComp"].is_null());
    }

    #[test]
    fn amounts_beyond_decimal_range_earn_nothing_instead_of_panicking() {
        let huge = Decimal::from_scientific("1e27").expect("decimal");
        let inputs = [
            WonService {
                renewal_type: Some("Standard".to_string()),
                mrr: huge,
                mrr_uptick: Some(Decimal::ONE),
                term: 1_000,
                ..service(Some(RevenueType::Renewal))
            },
            WonService {
                mrr: -huge * Decimal::from(50),
                mrr_uptick: Some(huge * Decimal::from(50)),
                ..service(Some(RevenueType::Upsell))
            },
            WonService { line_margin: Decimal::MAX, ..service(Some(RevenueType::New)) },
        ];

        for input in inputs {
            let breakdown = std::panic::catch_unwind(|| calculate(&input)).expect("no panic");
            assert_eq!(breakdown.total_comp, Decimal::ZERO);
            assert_eq!(breakdown.explanation, OUT_OF_RANGE_EXPLANATION);
            assert_eq!(breakdown.existing_mrr, input.mrr);
            assert!(!breakdown.has_new_slice());
            assert_total_invariant(&breakdown);
        }
    }
}
