use clap::Args;
use rust_decimal::Decimal;
use wincomp_core::{calculate, RevenueType, WonService};
use wincomp_dataverse::option_sets::revenue_type_from_code;

use crate::commands::{CommandResult, EXIT_CONFIG_FAILURE};

#[derive(Debug, Clone, Args)]
pub struct CalcArgs {
    #[arg(long, help = "new | net-new | upsell | renewal, or a cr_revenuetype option-set code")]
    pub revenue_type: String,
    #[arg(long, value_parser = parse_decimal, help = "Monthly recurring revenue")]
    pub mrr: Decimal,
    #[arg(long, value_parser = parse_decimal, help = "Total contract value")]
    pub tcv: Decimal,
    #[arg(long, help = "Contract term in months")]
    pub term: i32,
    #[arg(long, value_parser = parse_decimal, help = "Line margin as a fraction, e.g. 0.30")]
    pub margin: Decimal,
    #[arg(long, value_parser = parse_decimal, help = "Monthly increase over the prior contract")]
    pub uptick: Option<Decimal>,
    #[arg(long, help = "Renewal type label, e.g. \"Early Renewal\"")]
    pub renewal_type: Option<String>,
}

pub fn run(args: &CalcArgs) -> CommandResult {
    if let Err(error) = WonService::check_term(args.term) {
        return CommandResult::failure(
            "calc",
            "invalid_input",
            error.to_string(),
            EXIT_CONFIG_FAILURE,
        );
    }

    let service = WonService {
        revenue_type: revenue_type(&args.revenue_type),
        renewal_type: args.renewal_type.clone(),
        mrr_uptick: args.uptick,
        tcv: args.tcv,
        line_margin: args.margin,
        term: args.term,
        mrr: args.mrr,
    };

    CommandResult::report("calc", 0, &calculate(&service))
}

/// Unrecognized values are kept as "no revenue type" so the result reports
/// that no rule matched.
fn revenue_type(raw: &str) -> Option<RevenueType> {
    RevenueType::parse(raw)
        .or_else(|| raw.trim().parse::<i64>().ok().and_then(revenue_type_from_code))
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    raw.trim().parse::<Decimal>().map_err(|error| format!("`{raw}` is not a number: {error}"))
}
