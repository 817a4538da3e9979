//! Number formatting for recommendation text

use rust_decimal::{Decimal, RoundingStrategy};

/// Dollar amount with thousands separators; cents only when non-zero
pub fn money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let abs = rounded.abs();
    let whole = abs.trunc();
    let cents = ((abs - whole) * Decimal::ONE_HUNDRED).trunc();

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    if cents.is_zero() {
        format!("{}${}", sign, grouped)
    } else {
        format!("{}${}.{:0>2}", sign, grouped, cents.to_string())
    }
}

/// Ratio as a percentage with one decimal, `0.6` -> `60.0%`
pub fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Months with one decimal
pub fn months(value: f64) -> String {
    format!("{:.1}", value)
}

/// `1st`, `2nd`, `3rd`, `11th`, `85th`
pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

pub fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 {
        one
    } else {
        many
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money() {
        assert_eq!(money(dec!(30000)), "$30,000");
        assert_eq!(money(dec!(30000.00)), "$30,000");
        assert_eq!(money(dec!(1234567.891)), "$1,234,567.89");
        assert_eq!(money(dec!(11.99)), "$11.99");
        assert_eq!(money(dec!(41.2)), "$41.20");
        assert_eq!(money(dec!(0.05)), "$0.05");
        assert_eq!(money(dec!(999)), "$999");
        assert_eq!(money(dec!(-1200)), "-$1,200");
        assert_eq!(money(Decimal::ZERO), "$0");
    }

    #[test]
    fn test_percent_and_months() {
        assert_eq!(percent(0.6), "60.0%");
        assert_eq!(percent(0.123), "12.3%");
        assert_eq!(months(9.0), "9.0");
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(22), "22nd");
        assert_eq!(ordinal(83), "83rd");
        assert_eq!(ordinal(85), "85th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(112), "112th");
    }
}
