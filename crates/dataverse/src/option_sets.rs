use wincomp_core::RevenueType;

/// `cr_revenuetype` option-set values as configured in the CRM solution.
const REVENUE_TYPE_CODES: [(i64, RevenueType); 4] = [
    (612_100_000, RevenueType::New),
    (612_100_001, RevenueType::NetNew),
    (612_100_002, RevenueType::Upsell),
    (612_100_003, RevenueType::Renewal),
];

pub fn revenue_type_from_code(code: i64) -> Option<RevenueType> {
    REVENUE_TYPE_CODES
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, revenue_type)| *revenue_type)
}

#[cfg(test)]
mod tests {
    use wincomp_core::RevenueType;

    use super::revenue_type_from_code;

    #[test]
    fn known_codes_map_to_revenue_types() {
        for (code, revenue_type) in [
            (612_100_000, RevenueType::New),
            (612_100_001, RevenueType::NetNew),
            (612_100_002, RevenueType::Upsell),
            (612_100_003, RevenueType::Renewal),
        ] {
            assert_eq!(revenue_type_from_code(code), Some(revenue_type));
        }
    }

    #[test]
    fn unknown_codes_are_unrecognized() {
        assert_eq!(revenue_type_from_code(999_999_999), None);
        assert_eq!(revenue_type_from_code(0), None);
    }
}
