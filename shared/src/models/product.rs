//! Product categories and unit handling
//!
//! The twelve categories mirror the CTLS reporting classes. Categories are
//! either mass-tracked (reported in kilograms) or count-tracked (reported in
//! whole units); the reconciliation and reporting code never mixes the two.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Regulatory product category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    Seeds,
    VegetativePlants,
    WholePlants,
    FreshCannabis,
    DriedCannabis,
    CannabisOil,
    ExtractsInhaled,
    ExtractsIngested,
    ExtractsOther,
    EdiblesSolid,
    EdiblesNonSolid,
    Topicals,
}

impl ProductCategory {
    /// All categories in regulatory column order. The order is load-bearing:
    /// the monthly inventory schema is generated from it.
    pub const ALL: [ProductCategory; 12] = [
        ProductCategory::Seeds,
        ProductCategory::VegetativePlants,
        ProductCategory::WholePlants,
        ProductCategory::FreshCannabis,
        ProductCategory::DriedCannabis,
        ProductCategory::CannabisOil,
        ProductCategory::ExtractsInhaled,
        ProductCategory::ExtractsIngested,
        ProductCategory::ExtractsOther,
        ProductCategory::EdiblesSolid,
        ProductCategory::EdiblesNonSolid,
        ProductCategory::Topicals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Seeds => "seeds",
            ProductCategory::VegetativePlants => "vegetative_plants",
            ProductCategory::WholePlants => "whole_plants",
            ProductCategory::FreshCannabis => "fresh_cannabis",
            ProductCategory::DriedCannabis => "dried_cannabis",
            ProductCategory::CannabisOil => "cannabis_oil",
            ProductCategory::ExtractsInhaled => "extracts_inhaled",
            ProductCategory::ExtractsIngested => "extracts_ingested",
            ProductCategory::ExtractsOther => "extracts_other",
            ProductCategory::EdiblesSolid => "edibles_solid",
            ProductCategory::EdiblesNonSolid => "edibles_non_solid",
            ProductCategory::Topicals => "topicals",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "seeds" => Some(ProductCategory::Seeds),
            "vegetative_plants" => Some(ProductCategory::VegetativePlants),
            "whole_plants" => Some(ProductCategory::WholePlants),
            "fresh_cannabis" => Some(ProductCategory::FreshCannabis),
            "dried_cannabis" => Some(ProductCategory::DriedCannabis),
            "cannabis_oil" => Some(ProductCategory::CannabisOil),
            "extracts_inhaled" => Some(ProductCategory::ExtractsInhaled),
            "extracts_ingested" => Some(ProductCategory::ExtractsIngested),
            "extracts_other" => Some(ProductCategory::ExtractsOther),
            "edibles_solid" => Some(ProductCategory::EdiblesSolid),
            "edibles_non_solid" => Some(ProductCategory::EdiblesNonSolid),
            "topicals" => Some(ProductCategory::Topicals),
            _ => None,
        }
    }

    /// Seeds and plants are tracked by count; everything else by mass.
    pub fn unit_class(&self) -> UnitClass {
        match self {
            ProductCategory::Seeds
            | ProductCategory::VegetativePlants
            | ProductCategory::WholePlants => UnitClass::Count,
            _ => UnitClass::Mass,
        }
    }
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductCategory::Seeds => write!(f, "Seeds"),
            ProductCategory::VegetativePlants => write!(f, "Vegetative Plants"),
            ProductCategory::WholePlants => write!(f, "Whole Plants"),
            ProductCategory::FreshCannabis => write!(f, "Fresh Cannabis"),
            ProductCategory::DriedCannabis => write!(f, "Dried Cannabis"),
            ProductCategory::CannabisOil => write!(f, "Cannabis Oil"),
            ProductCategory::ExtractsInhaled => write!(f, "Extracts - Inhaled"),
            ProductCategory::ExtractsIngested => write!(f, "Extracts - Ingested"),
            ProductCategory::ExtractsOther => write!(f, "Extracts - Other"),
            ProductCategory::EdiblesSolid => write!(f, "Edibles - Solid"),
            ProductCategory::EdiblesNonSolid => write!(f, "Edibles - Non-solid"),
            ProductCategory::Topicals => write!(f, "Topicals"),
        }
    }
}

/// Whether a quantity is a mass or a discrete count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitClass {
    Mass,
    Count,
}

/// Unit of measure for batch quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfMeasure {
    Milligrams,
    Grams,
    Kilograms,
    Units,
}

impl UnitOfMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfMeasure::Milligrams => "mg",
            UnitOfMeasure::Grams => "g",
            UnitOfMeasure::Kilograms => "kg",
            UnitOfMeasure::Units => "units",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mg" => Some(UnitOfMeasure::Milligrams),
            "g" => Some(UnitOfMeasure::Grams),
            "kg" => Some(UnitOfMeasure::Kilograms),
            "units" => Some(UnitOfMeasure::Units),
            _ => None,
        }
    }

    pub fn unit_class(&self) -> UnitClass {
        match self {
            UnitOfMeasure::Units => UnitClass::Count,
            _ => UnitClass::Mass,
        }
    }
}

/// A count category must carry `units`; a mass category must carry a mass unit.
pub fn unit_matches_category(category: ProductCategory, unit: UnitOfMeasure) -> bool {
    category.unit_class() == unit.unit_class()
}

/// Convert a mass quantity to kilograms. Returns None for count units.
pub fn to_kilograms(quantity: Decimal, unit: UnitOfMeasure) -> Option<Decimal> {
    match unit {
        UnitOfMeasure::Milligrams => Some(quantity / Decimal::from(1_000_000)),
        UnitOfMeasure::Grams => Some(quantity / Decimal::from(1000)),
        UnitOfMeasure::Kilograms => Some(quantity),
        UnitOfMeasure::Units => None,
    }
}

/// Convert a mass quantity to grams. Returns None for count units.
pub fn to_grams(quantity: Decimal, unit: UnitOfMeasure) -> Option<Decimal> {
    match unit {
        UnitOfMeasure::Milligrams => Some(quantity / Decimal::from(1000)),
        UnitOfMeasure::Grams => Some(quantity),
        UnitOfMeasure::Kilograms => Some(quantity * Decimal::from(1000)),
        UnitOfMeasure::Units => None,
    }
}

/// Normalize a quantity for regulatory report cells: mass in kilograms,
/// counts unchanged.
pub fn normalize_for_report(quantity: Decimal, unit: UnitOfMeasure) -> Decimal {
    to_kilograms(quantity, unit).unwrap_or(quantity)
}

/// Normalize a quantity for threshold comparison: mass in grams, counts
/// unchanged. Detection and reporting thresholds are expressed in grams for
/// mass categories and whole units for count categories.
pub fn normalize_for_threshold(quantity: Decimal, unit: UnitOfMeasure) -> Decimal {
    to_grams(quantity, unit).unwrap_or(quantity)
}
