//! Validation utilities for the Cannabis Cultivation Compliance Platform
//!
//! Includes Canada-specific validations for compliance with federal
//! licensing and reporting requirements.

use rust_decimal::Decimal;

use crate::models::{unit_matches_category, ProductCategory, UnitOfMeasure};

// ============================================================================
// Quantity Validations
// ============================================================================

/// Validate a quantity is non-negative
pub fn validate_non_negative_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity < Decimal::ZERO {
        return Err("Quantity cannot be negative");
    }
    Ok(())
}

/// Validate a split quantity: must be positive and strictly less than the
/// source batch quantity
pub fn validate_split_quantity(split: Decimal, available: Decimal) -> Result<(), &'static str> {
    if split <= Decimal::ZERO {
        return Err("Split quantity must be greater than zero");
    }
    if split >= available {
        return Err("Split quantity must be less than the source batch quantity");
    }
    Ok(())
}

/// Validate a processed quantity: between zero and the available quantity
pub fn validate_processed_quantity(
    processed: Decimal,
    available: Decimal,
) -> Result<(), &'static str> {
    if processed < Decimal::ZERO {
        return Err("Processed quantity cannot be negative");
    }
    if processed > available {
        return Err("Processed quantity cannot exceed the batch quantity");
    }
    Ok(())
}

/// Validate a unit of measure matches its product category's class
pub fn validate_unit_for_category(
    category: ProductCategory,
    unit: UnitOfMeasure,
) -> Result<(), &'static str> {
    if !unit_matches_category(category, unit) {
        return Err("Unit of measure does not match the product category");
    }
    Ok(())
}

// ============================================================================
// Canada-Specific Validations
// ============================================================================

/// Validate a cannabis licence number format
/// Format: LIC-YYYY-NNNNN (e.g., LIC-2024-00123)
pub fn validate_licence_number(licence: &str) -> Result<(), &'static str> {
    let parts: Vec<&str> = licence.split('-').collect();

    if parts.len() != 3 {
        return Err("Licence number must be in format LIC-YYYY-NNNNN");
    }

    if parts[0] != "LIC" {
        return Err("Licence number must start with 'LIC'");
    }

    // Validate year
    if parts[1].len() != 4 || !parts[1].chars().all(|c| c.is_ascii_digit()) {
        return Err("Invalid year in licence number");
    }

    // Validate sequence number
    if parts[2].len() != 5 || !parts[2].chars().all(|c| c.is_ascii_digit()) {
        return Err("Invalid sequence number in licence number");
    }

    Ok(())
}

/// Validate site code format (3-10 uppercase alphanumeric)
pub fn validate_site_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 3 {
        return Err("Site code must be at least 3 characters");
    }
    if code.len() > 10 {
        return Err("Site code must be at most 10 characters");
    }
    if !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err("Site code must be uppercase alphanumeric only");
    }
    Ok(())
}

/// Letters that never appear in a Canadian postal code
const POSTAL_EXCLUDED: &[char] = &['D', 'F', 'I', 'O', 'Q', 'U'];

/// Validate a Canadian postal code (A1A 1A1, space optional)
pub fn validate_postal_code(postal_code: &str) -> Result<(), &'static str> {
    let compact: String = postal_code
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    if compact.len() != 6 {
        return Err("Postal code must be six characters");
    }

    let chars: Vec<char> = compact.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if i % 2 == 0 {
            if !c.is_ascii_uppercase() || POSTAL_EXCLUDED.contains(c) {
                return Err("Invalid letter in postal code");
            }
        } else if !c.is_ascii_digit() {
            return Err("Invalid digit in postal code");
        }
    }

    // W and Z are valid interior letters but never lead a forward sortation area
    if chars[0] == 'W' || chars[0] == 'Z' {
        return Err("Invalid leading letter in postal code");
    }

    Ok(())
}

/// Canadian provinces and territories (postal abbreviations)
pub const CANADIAN_PROVINCES: &[&str] = &[
    "AB", "BC", "MB", "NB", "NL", "NS", "NT", "NU", "ON", "PE", "QC", "SK", "YT",
];

/// Canadian provinces and territories (English names)
pub const CANADIAN_PROVINCES_EN: &[&str] = &[
    "Alberta",
    "British Columbia",
    "Manitoba",
    "New Brunswick",
    "Newfoundland and Labrador",
    "Nova Scotia",
    "Northwest Territories",
    "Nunavut",
    "Ontario",
    "Prince Edward Island",
    "Quebec",
    "Saskatchewan",
    "Yukon",
];

/// Validate a province/territory by abbreviation or English name
pub fn validate_province(province: &str) -> Result<(), &'static str> {
    let upper = province.to_ascii_uppercase();
    if CANADIAN_PROVINCES.contains(&upper.as_str()) {
        return Ok(());
    }

    let lower = province.to_lowercase();
    if CANADIAN_PROVINCES_EN
        .iter()
        .any(|p| p.to_lowercase() == lower)
    {
        return Ok(());
    }

    Err("Province is not a recognized Canadian province or territory")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Quantity Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_non_negative_quantity() {
        assert!(validate_non_negative_quantity(Decimal::ZERO).is_ok());
        assert!(validate_non_negative_quantity(Decimal::from(100)).is_ok());
        assert!(validate_non_negative_quantity(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_validate_split_quantity_valid() {
        assert!(validate_split_quantity(Decimal::from(30), Decimal::from(100)).is_ok());
        assert!(validate_split_quantity(Decimal::from(99), Decimal::from(100)).is_ok());
    }

    #[test]
    fn test_validate_split_quantity_invalid() {
        // Zero and negative
        assert!(validate_split_quantity(Decimal::ZERO, Decimal::from(100)).is_err());
        assert!(validate_split_quantity(Decimal::from(-5), Decimal::from(100)).is_err());
        // Equal to source
        assert!(validate_split_quantity(Decimal::from(100), Decimal::from(100)).is_err());
        // Greater than source
        assert!(validate_split_quantity(Decimal::from(101), Decimal::from(100)).is_err());
    }

    #[test]
    fn test_validate_processed_quantity() {
        assert!(validate_processed_quantity(Decimal::ZERO, Decimal::from(100)).is_ok());
        assert!(validate_processed_quantity(Decimal::from(100), Decimal::from(100)).is_ok());
        assert!(validate_processed_quantity(Decimal::from(60), Decimal::from(100)).is_ok());
        assert!(validate_processed_quantity(Decimal::from(-1), Decimal::from(100)).is_err());
        assert!(validate_processed_quantity(Decimal::from(101), Decimal::from(100)).is_err());
    }

    #[test]
    fn test_validate_unit_for_category() {
        assert!(validate_unit_for_category(ProductCategory::Seeds, UnitOfMeasure::Units).is_ok());
        assert!(
            validate_unit_for_category(ProductCategory::DriedCannabis, UnitOfMeasure::Grams)
                .is_ok()
        );
        assert!(validate_unit_for_category(ProductCategory::Seeds, UnitOfMeasure::Grams).is_err());
        assert!(
            validate_unit_for_category(ProductCategory::DriedCannabis, UnitOfMeasure::Units)
                .is_err()
        );
    }

    // ========================================================================
    // Canada-Specific Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_licence_number_valid() {
        assert!(validate_licence_number("LIC-2024-00123").is_ok());
        assert!(validate_licence_number("LIC-2023-99999").is_ok());
    }

    #[test]
    fn test_validate_licence_number_invalid() {
        assert!(validate_licence_number("LIC-24-123").is_err());
        assert!(validate_licence_number("PERMIT-2024-00123").is_err());
        assert!(validate_licence_number("LIC202400123").is_err());
        assert!(validate_licence_number("LIC-2024-ABCDE").is_err());
    }

    #[test]
    fn test_validate_site_code_valid() {
        assert!(validate_site_code("NIA").is_ok());
        assert!(validate_site_code("BC7").is_ok());
        assert!(validate_site_code("ABCDEFGHIJ").is_ok());
    }

    #[test]
    fn test_validate_site_code_invalid() {
        assert!(validate_site_code("AB").is_err()); // Too short
        assert!(validate_site_code("ABCDEFGHIJK").is_err()); // Too long
        assert!(validate_site_code("nia").is_err()); // Lowercase
        assert!(validate_site_code("NI-A").is_err()); // Special char
    }

    #[test]
    fn test_validate_postal_code_valid() {
        assert!(validate_postal_code("K1A 0B1").is_ok());
        assert!(validate_postal_code("K1A0B1").is_ok());
        assert!(validate_postal_code("v5k 0a1").is_ok()); // Case insensitive
    }

    #[test]
    fn test_validate_postal_code_invalid() {
        assert!(validate_postal_code("12345").is_err()); // US zip
        assert!(validate_postal_code("K1A 0B").is_err()); // Too short
        assert!(validate_postal_code("D1A 0B1").is_err()); // Excluded letter
        assert!(validate_postal_code("W1A 0B1").is_err()); // Invalid lead
        assert!(validate_postal_code("K1A 0BB").is_err()); // Letter where digit expected
    }

    #[test]
    fn test_validate_province_valid() {
        assert!(validate_province("ON").is_ok());
        assert!(validate_province("bc").is_ok()); // Case insensitive
        assert!(validate_province("Ontario").is_ok());
        assert!(validate_province("nova scotia").is_ok());
    }

    #[test]
    fn test_validate_province_invalid() {
        assert!(validate_province("ZZ").is_err());
        assert!(validate_province("California").is_err());
    }

    #[test]
    fn test_all_provinces_listed() {
        assert_eq!(CANADIAN_PROVINCES.len(), 13);
        assert_eq!(CANADIAN_PROVINCES_EN.len(), 13);
    }
}
