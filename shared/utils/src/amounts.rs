use rust_decimal::{Decimal, RoundingStrategy};

/// Storage scale for money values (tenge with 2 fractional digits).
pub const MONEY_SCALE: u32 = 2;

pub struct AmountParser;

impl AmountParser {
    /// Tolerant amount parse for imported payloads: strips whitespace
    /// (including non-breaking spaces used as thousands separators) and
    /// accepts `,` as the decimal separator. A comma is treated as a
    /// thousands separator only when a `.` decimal point is also present.
    pub fn parse(raw: &str) -> Option<Decimal> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\u{00a0}')
            .collect();
        if cleaned.is_empty() {
            return None;
        }

        let normalized = if cleaned.contains(',') && cleaned.contains('.') {
            cleaned.replace(',', "")
        } else {
            cleaned.replace(',', ".")
        };

        normalized.parse::<Decimal>().ok()
    }
}

pub struct AmountRounding;

impl AmountRounding {
    /// Rounds to storage scale, half-up.
    pub fn to_money(amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Rounds to a whole number, half-up. Form cells carry whole tenge.
    pub fn to_whole(amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Rounds to an arbitrary scale, half-up.
    pub fn to_scale(amount: Decimal, scale: u32) -> Decimal {
        amount.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
    }
}
