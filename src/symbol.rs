// src/symbol.rs

/// Whether a ticker follows the numeric domestic-exchange convention and can
/// be looked up against the TWSE quote endpoint.
pub fn is_eligible(symbol: &str) -> bool {
    !symbol.is_empty() && symbol.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_are_eligible() {
        assert!(is_eligible("2330"));
        assert!(is_eligible("0050"));
        assert!(is_eligible("6488"));
    }

    #[test]
    fn foreign_and_mixed_codes_are_not() {
        assert!(!is_eligible("AAPL"));
        assert!(!is_eligible("00631L"));
        assert!(!is_eligible("2330.TW"));
        assert!(!is_eligible(" 2330"));
    }

    #[test]
    fn empty_symbol_is_not_eligible() {
        assert!(!is_eligible(""));
    }

    #[test]
    fn non_ascii_digits_are_rejected() {
        // full-width digits
        assert!(!is_eligible("２３３０"));
    }
}
