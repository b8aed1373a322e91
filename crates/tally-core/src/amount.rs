//! Receipt amount parsing
//!
//! Turns raw OCR text into a best-guess amount. The keyword anchors are the
//! phrases printed next to the fare on ride and subscription receipts, in
//! English and Russian, including the common OCR misreading of the leading
//! "О" of "Общая" as a zero or a Latin "o".

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{Error, Result};

fn amount_regex() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(
            r"(?is)(?:total\s+cost|trip\s+cost|by\s+subscription|[оo0]бщая\s+стоимост[ьъ]|стоимость\s+поездки|подпиской).*?([0-9]+(?:[.,][0-9]{1,2})?)",
        )
        .expect("amount regex is valid")
    })
}

/// Integers above this value lose their last digit unconditionally
const UNCONDITIONAL_TRIM_ABOVE: u64 = 4000;

/// Integers above this value lose their last digit when it is a 2
const TRAILING_TWO_TRIM_ABOVE: u64 = 2000;

/// Extract the amount following the first keyword phrase in `text`
///
/// Returns `None` when no keyword phrase followed by a number is present.
///
/// Whole numbers go through [`correct_trailing_digit`]; amounts with a
/// fractional part are returned as read.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let captured = amount_regex().captures(text)?.get(1)?.as_str();

    if captured.contains(['.', ',']) {
        return parse_stored_amount(captured).ok();
    }

    match captured.parse::<u64>() {
        Ok(number) => Some(Decimal::from(correct_trailing_digit(number))),
        Err(e) => {
            debug!(captured, error = %e, "Captured amount does not fit an integer");
            None
        }
    }
}

/// Drop a spurious trailing digit that OCR tends to append to large fares
///
/// Fires when the number is above 2000 and ends in 2, or when it is above
/// 4000 whatever its last digit. This is an empirical patch for observed
/// OCR noise, not a financial rule, so the result is approximate.
pub fn correct_trailing_digit(number: u64) -> u64 {
    let ends_in_two = number % 10 == 2;
    if (number > TRAILING_TWO_TRIM_ABOVE && ends_in_two) || number > UNCONDITIONAL_TRIM_ABOVE {
        number / 10
    } else {
        number
    }
}

/// Parse an amount read back from a ledger file
///
/// Accepts both `.` and `,` as the fractional separator.
pub fn parse_stored_amount(s: &str) -> Result<Decimal> {
    let normalized = s.trim().replace(',', ".");
    Decimal::from_str(&normalized).map_err(|e| Error::InvalidAmount(format!("'{}': {}", s, e)))
}

/// Parse an amount typed by a user, e.g. `18,03` or `18.03`
pub fn parse_manual_amount(text: &str) -> Result<Decimal> {
    let amount = parse_stored_amount(text)?;
    if amount.is_sign_negative() {
        return Err(Error::InvalidAmount(format!("'{}' is negative", text.trim())));
    }
    Ok(amount)
}

/// Render an amount for a ledger line using the configured separator
pub fn format_amount(amount: Decimal, separator: char) -> String {
    let text = amount.to_string();
    if separator == '.' {
        text
    } else {
        text.replace('.', &separator.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_plain_amount() {
        assert_eq!(parse_amount("Total cost: 199"), Some(dec("199")));
    }

    #[test]
    fn test_parse_no_keyword() {
        assert_eq!(parse_amount("no keyword here"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_parse_keyword_without_number() {
        assert_eq!(parse_amount("Total cost: free"), None);
    }

    #[test]
    fn test_parse_fractional_amount_with_comma() {
        assert_eq!(parse_amount("Trip cost 18,03 BYN"), Some(dec("18.03")));
    }

    #[test]
    fn test_parse_fractional_amount_is_not_corrected() {
        // The heuristic only applies to whole numbers
        assert_eq!(parse_amount("Total cost: 4500.50"), Some(dec("4500.50")));
    }

    #[test]
    fn test_parse_tolerates_case_and_line_breaks() {
        let text = "RECEIPT\nTOTAL\nCOST\n\n  12.5 rub";
        assert_eq!(parse_amount(text), Some(dec("12.5")));
    }

    #[test]
    fn test_parse_russian_keywords() {
        assert_eq!(parse_amount("Общая стоимость 15,40 р."), Some(dec("15.40")));
        assert_eq!(parse_amount("Оплачено подпиской 0"), Some(dec("0")));
        assert_eq!(parse_amount("Стоимость поездки: 7"), Some(dec("7")));
    }

    #[test]
    fn test_parse_ocr_misread_keyword() {
        assert_eq!(parse_amount("0бщая стоимостъ 33"), Some(dec("33")));
    }

    #[test]
    fn test_parse_takes_first_keyword_match() {
        let text = "by subscription 10\ntotal cost 20";
        assert_eq!(parse_amount(text), Some(dec("10")));
    }

    // The trailing-digit correction is an empirical heuristic. These tests pin
    // its current behavior; they do not claim the corrected values are right.

    #[test]
    fn test_heuristic_trailing_two_above_2000() {
        assert_eq!(parse_amount("Total cost: 2502"), Some(dec("250")));
    }

    #[test]
    fn test_heuristic_unconditional_above_4000() {
        assert_eq!(parse_amount("Total cost: 4500"), Some(dec("450")));
    }

    #[test]
    fn test_heuristic_boundaries() {
        assert_eq!(correct_trailing_digit(2000), 2000);
        assert_eq!(correct_trailing_digit(2002), 200);
        assert_eq!(correct_trailing_digit(1992), 1992);
        assert_eq!(correct_trailing_digit(3001), 3001);
        assert_eq!(correct_trailing_digit(4000), 4000);
        assert_eq!(correct_trailing_digit(4001), 400);
    }

    #[test]
    fn test_parse_stored_amount_accepts_both_separators() {
        assert_eq!(parse_stored_amount("12,50").unwrap(), dec("12.50"));
        assert_eq!(parse_stored_amount("12.50").unwrap(), dec("12.50"));
        assert!(parse_stored_amount("twelve").is_err());
    }

    #[test]
    fn test_parse_manual_amount_rejects_negative_and_garbage() {
        assert_eq!(parse_manual_amount(" 18,03 ").unwrap(), dec("18.03"));
        assert!(parse_manual_amount("-5").is_err());
        assert!(parse_manual_amount("hello").is_err());
    }

    #[test]
    fn test_format_amount_uses_separator() {
        assert_eq!(format_amount(dec("18.03"), ','), "18,03");
        assert_eq!(format_amount(dec("18.03"), '.'), "18.03");
        assert_eq!(format_amount(dec("250"), ','), "250");
    }
}
