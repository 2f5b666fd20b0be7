//! Logical-field codes of form 270.00 and the closed groups the engine
//! subtotals over. Every code here exists in the seed catalog.

pub const INCOME_PROPERTY_KZ: &str = "LF_INCOME_PROPERTY_KZ";
pub const INCOME_PROPERTY_ABROAD: &str = "LF_INCOME_PROPERTY_ABROAD";
pub const INCOME_PROPERTY_VEHICLE: &str = "LF_INCOME_PROPERTY_VEHICLE";
pub const INCOME_PROPERTY_TOTAL: &str = "LF_INCOME_PROPERTY_TOTAL";

pub const INCOME_RENT_NON_AGENT: &str = "LF_INCOME_RENT_NON_AGENT";
pub const INCOME_ASSIGNMENT: &str = "LF_INCOME_ASSIGNMENT";
pub const INCOME_IP_OTHER_ASSETS: &str = "LF_INCOME_IP_OTHER_ASSETS";

pub const INCOME_FOREIGN_DIVIDENDS: &str = "LF_INCOME_FOREIGN_DIVIDENDS";
pub const INCOME_FOREIGN_INTEREST: &str = "LF_INCOME_FOREIGN_INTEREST";
pub const INCOME_FOREIGN_ROYALTY: &str = "LF_INCOME_FOREIGN_ROYALTY";
pub const INCOME_FOREIGN_EMPLOYMENT: &str = "LF_INCOME_FOREIGN_EMPLOYMENT";
pub const INCOME_FOREIGN_CAPITAL_GAINS: &str = "LF_INCOME_FOREIGN_CAPITAL_GAINS";
pub const INCOME_FOREIGN_RENT: &str = "LF_INCOME_FOREIGN_RENT";
pub const INCOME_FOREIGN_PENSION: &str = "LF_INCOME_FOREIGN_PENSION";
pub const INCOME_FOREIGN_BUSINESS: &str = "LF_INCOME_FOREIGN_BUSINESS";
pub const INCOME_FOREIGN_OTHER: &str = "LF_INCOME_FOREIGN_OTHER";
pub const INCOME_FOREIGN_TOTAL: &str = "LF_INCOME_FOREIGN_TOTAL";

pub const INCOME_EMPLOYMENT_NON_AGENT: &str = "LF_INCOME_EMPLOYMENT_NON_AGENT";
pub const INCOME_SERVICE_NON_AGENT: &str = "LF_INCOME_SERVICE_NON_AGENT";
pub const INCOME_WINNINGS: &str = "LF_INCOME_WINNINGS";
pub const INCOME_INTEREST_NON_AGENT: &str = "LF_INCOME_INTEREST_NON_AGENT";
pub const INCOME_DIVIDENDS_NON_AGENT: &str = "LF_INCOME_DIVIDENDS_NON_AGENT";
pub const INCOME_OTHER_NON_AGENT: &str = "LF_INCOME_OTHER_NON_AGENT";

pub const CFC_PROFIT: &str = "LF_CFC_PROFIT";

pub const INCOME_TOTAL: &str = "LF_INCOME_TOTAL";

pub const DEDUCTION_STANDARD: &str = "LF_DEDUCTION_STANDARD";
pub const DEDUCTION_OTHER: &str = "LF_DEDUCTION_OTHER";
pub const DEDUCTION_TOTAL: &str = "LF_DEDUCTION_TOTAL";

pub const ADJUSTMENT_EXEMPT: &str = "LF_ADJUSTMENT_EXEMPT";
pub const ADJUSTMENT_NON_TAXABLE: &str = "LF_ADJUSTMENT_NON_TAXABLE";
pub const ADJUSTMENT_CORRECTION: &str = "LF_ADJUSTMENT_CORRECTION";
pub const ADJUSTMENT_OTHER: &str = "LF_ADJUSTMENT_OTHER";
pub const ADJUSTMENT_TOTAL: &str = "LF_ADJUSTMENT_TOTAL";

pub const TAXABLE_INCOME: &str = "LF_TAXABLE_INCOME";
pub const IPN_CALCULATED: &str = "LF_IPN_CALCULATED";
pub const IPN_PAYABLE: &str = "LF_IPN_PAYABLE";
pub const FOREIGN_TAX_CREDIT_GENERAL: &str = "LF_FOREIGN_TAX_CREDIT_GENERAL";
pub const FOREIGN_TAX_CREDIT_CFC: &str = "LF_FOREIGN_TAX_CREDIT_CFC";

/// The three property-sale fields summed into the property subtotal.
pub const PROPERTY_FIELDS: [&str; 3] = [
    INCOME_PROPERTY_KZ,
    INCOME_PROPERTY_ABROAD,
    INCOME_PROPERTY_VEHICLE,
];

/// The nine foreign-income fields summed into the foreign subtotal.
pub const FOREIGN_FIELDS: [&str; 9] = [
    INCOME_FOREIGN_DIVIDENDS,
    INCOME_FOREIGN_INTEREST,
    INCOME_FOREIGN_ROYALTY,
    INCOME_FOREIGN_EMPLOYMENT,
    INCOME_FOREIGN_CAPITAL_GAINS,
    INCOME_FOREIGN_RENT,
    INCOME_FOREIGN_PENSION,
    INCOME_FOREIGN_BUSINESS,
    INCOME_FOREIGN_OTHER,
];

pub const DEDUCTION_FIELDS: [&str; 2] = [DEDUCTION_STANDARD, DEDUCTION_OTHER];

pub const ADJUSTMENT_FIELDS: [&str; 4] = [
    ADJUSTMENT_EXEMPT,
    ADJUSTMENT_NON_TAXABLE,
    ADJUSTMENT_CORRECTION,
    ADJUSTMENT_OTHER,
];

/// The twelve primary income categories summed into `LF_INCOME_TOTAL`.
/// The two embedded subtotals are read from the field map, so this sum
/// must run after the property and foreign subtotals are settled.
pub const PRIMARY_INCOME_FIELDS: [&str; 12] = [
    INCOME_PROPERTY_TOTAL,
    INCOME_RENT_NON_AGENT,
    INCOME_ASSIGNMENT,
    INCOME_IP_OTHER_ASSETS,
    INCOME_FOREIGN_TOTAL,
    INCOME_EMPLOYMENT_NON_AGENT,
    INCOME_SERVICE_NON_AGENT,
    INCOME_WINNINGS,
    INCOME_INTEREST_NON_AGENT,
    INCOME_DIVIDENDS_NON_AGENT,
    INCOME_OTHER_NON_AGENT,
    CFC_PROFIT,
];

/// Fields a declaration must carry before it can leave DRAFT.
pub const VALIDATION_REQUIRED_FIELDS: [&str; 3] =
    [INCOME_TOTAL, TAXABLE_INCOME, IPN_CALCULATED];
