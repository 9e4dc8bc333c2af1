use rust_decimal::Decimal;

/// Flat rate paid on the pre-existing slice of renewals and upsells.
pub const EXISTING_REVENUE_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Upper bound (exclusive, margin percent) and the rate paid below it.
/// Anything at or above the last bound earns [`TOP_TIER_RATE`].
const MARGIN_TIERS: [(Decimal, Decimal); 5] = [
    (Decimal::from_parts(5, 0, 0, false, 0), Decimal::ZERO),
    (Decimal::from_parts(15, 0, 0, false, 0), Decimal::from_parts(6, 0, 0, false, 2)),
    (Decimal::from_parts(30, 0, 0, false, 0), Decimal::from_parts(10, 0, 0, false, 2)),
    (Decimal::from_parts(50, 0, 0, false, 0), Decimal::from_parts(14, 0, 0, false, 2)),
    (Decimal::from_parts(60, 0, 0, false, 0), Decimal::from_parts(20, 0, 0, false, 2)),
];

const TOP_TIER_RATE: Decimal = Decimal::from_parts(22, 0, 0, false, 2);

/// Commission rate for new money at the given margin percent (0-100 scale).
///
/// Tiers are checked in ascending order with `<`, so a margin sitting exactly
/// on a boundary lands in the higher bracket.
pub fn commission_rate(margin_percent: Decimal) -> Decimal {
    MARGIN_TIERS
        .iter()
        .find(|(upper, _)| margin_percent < *upper)
        .map(|(_, rate)| *rate)
        .unwrap_or(TOP_TIER_RATE)
}
