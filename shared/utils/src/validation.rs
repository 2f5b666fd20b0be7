use regex::Regex;

pub struct KazakhstanValidator;

impl KazakhstanValidator {
    /// Validates a taxpayer IIN: exactly 12 digits, with a plausible
    /// birth-date prefix (digits 3-4 encode the month).
    pub fn validate_iin(iin: &str) -> bool {
        let digits: String = iin.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.len() != 12 || digits.len() != iin.trim().len() {
            return false;
        }

        match digits[2..4].parse::<u32>() {
            Ok(month) => (1..=12).contains(&month),
            Err(_) => false,
        }
    }

    /// Validates a Kazakhstan phone number:
    /// +7, 7 or 8 followed by a 10-digit subscriber number.
    pub fn validate_phone_number(phone: &str) -> bool {
        let phone_regex = Regex::new(r"^(\+7|7|8)7[0-9]{9}$").unwrap();
        let compact: String = phone.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
        phone_regex.is_match(&compact)
    }
}

#[derive(Debug)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn combine(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_iin() {
        assert!(KazakhstanValidator::validate_iin("850615300123"));
    }

    #[test]
    fn test_iin_wrong_length() {
        assert!(!KazakhstanValidator::validate_iin("85061530012"));
        assert!(!KazakhstanValidator::validate_iin("8506153001234"));
    }

    #[test]
    fn test_iin_bad_month() {
        assert!(!KazakhstanValidator::validate_iin("851315300123"));
        assert!(!KazakhstanValidator::validate_iin("850015300123"));
    }

    #[test]
    fn test_iin_rejects_letters() {
        assert!(!KazakhstanValidator::validate_iin("85061530012X"));
    }

    #[test]
    fn test_phone_number() {
        assert!(KazakhstanValidator::validate_phone_number("+77011234567"));
        assert!(KazakhstanValidator::validate_phone_number("87011234567"));
        assert!(KazakhstanValidator::validate_phone_number("+7 701 123-45-67"));
        assert!(!KazakhstanValidator::validate_phone_number("+1234"));
    }
}
