/// Default currency assumed when a source payload carries none.
pub const DEFAULT_CURRENCY: &str = "KZT";

pub struct CurrencyNormalizer;

impl CurrencyNormalizer {
    /// Maps human words and symbols to ISO codes. Applied after
    /// case-folding, before truncation to three letters.
    fn alias(raw: &str) -> Option<&'static str> {
        match raw {
            "$" | "ДОЛЛАР" | "ДОЛЛАРЫ" | "DOLLAR" | "DOLLARS" => Some("USD"),
            "€" | "ЕВРО" | "EURO" | "EUROS" => Some("EUR"),
            "₸" | "ТГ" | "ТЕНГЕ" | "TENGE" => Some("KZT"),
            "₽" | "РУБ" | "РУБЛЬ" | "РУБЛИ" | "RUBLE" => Some("RUB"),
            "£" | "ФУНТ" | "POUND" => Some("GBP"),
            "¥" | "ЮАНЬ" | "YUAN" => Some("CNY"),
            _ => None,
        }
    }

    /// Normalizes a source currency to a 3-letter ISO code: case-folds,
    /// trims, applies the alias table, then keeps the first three ASCII
    /// letters. Absent or unrecognizable input yields KZT.
    pub fn normalize(raw: Option<&str>) -> String {
        let Some(raw) = raw else {
            return DEFAULT_CURRENCY.to_string();
        };

        let upper = raw.trim().to_uppercase();
        if upper.is_empty() {
            return DEFAULT_CURRENCY.to_string();
        }

        if let Some(code) = Self::alias(upper.as_str()) {
            return code.to_string();
        }

        let letters: String = upper
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .take(3)
            .collect();

        if letters.len() == 3 {
            letters
        } else {
            DEFAULT_CURRENCY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_defaults_to_kzt() {
        assert_eq!(CurrencyNormalizer::normalize(None), "KZT");
        assert_eq!(CurrencyNormalizer::normalize(Some("  ")), "KZT");
    }

    #[test]
    fn test_symbol_aliases() {
        assert_eq!(CurrencyNormalizer::normalize(Some("$")), "USD");
        assert_eq!(CurrencyNormalizer::normalize(Some("€")), "EUR");
        assert_eq!(CurrencyNormalizer::normalize(Some("₸")), "KZT");
    }

    #[test]
    fn test_word_aliases() {
        assert_eq!(CurrencyNormalizer::normalize(Some("тенге")), "KZT");
        assert_eq!(CurrencyNormalizer::normalize(Some("Доллар")), "USD");
    }

    #[test]
    fn test_case_fold_and_truncate() {
        assert_eq!(CurrencyNormalizer::normalize(Some("usd")), "USD");
        assert_eq!(CurrencyNormalizer::normalize(Some(" eur ")), "EUR");
        assert_eq!(CurrencyNormalizer::normalize(Some("USDT")), "USD");
    }

    #[test]
    fn test_unrecognizable_defaults_to_kzt() {
        assert_eq!(CurrencyNormalizer::normalize(Some("??")), "KZT");
    }
}
