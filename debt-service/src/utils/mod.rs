//! Display helpers.

use rust_decimal::{Decimal, RoundingStrategy};

/// Label appended to displayed amounts.
pub const CURRENCY_LABEL: &str = "CFA";

/// Format an amount for display: whole currency units, French digit
/// grouping (narrow no-break space), currency label.
///
/// Rounding is for display only; ledger amounts keep their exact value.
pub fn format_amount(amount: Decimal) -> String {
    let units = amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .trunc();
    let digits = units.abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 * 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('\u{202F}');
        }
        grouped.push(ch);
    }

    let sign = if units.is_sign_negative() && !units.is_zero() {
        "-"
    } else {
        ""
    };

    format!("{}{} {}", sign, grouped, CURRENCY_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_small_amounts_are_not_grouped() {
        assert_eq!(format_amount(dec!(40)), "40 CFA");
        assert_eq!(format_amount(dec!(999)), "999 CFA");
        assert_eq!(format_amount(dec!(0.40)), "0 CFA");
    }

    #[test]
    fn test_thousands_use_narrow_no_break_space() {
        assert_eq!(format_amount(dec!(1500)), "1\u{202F}500 CFA");
        assert_eq!(format_amount(dec!(1234567)), "1\u{202F}234\u{202F}567 CFA");
    }

    #[test]
    fn test_amount_is_rounded_half_up() {
        assert_eq!(format_amount(dec!(1499.50)), "1\u{202F}500 CFA");
        assert_eq!(format_amount(dec!(1499.49)), "1\u{202F}499 CFA");
    }
}
