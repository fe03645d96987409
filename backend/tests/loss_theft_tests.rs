//! Loss/theft detection and reporting threshold tests
//!
//! Two threshold tables are covered: the operational detection table that
//! opens automatic incident reports during reconciliation, and the fixed
//! Health Canada table that decides when an incident must be reported.
//! Mass comparisons happen in grams regardless of the batch's unit.

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{
    hc_reporting_threshold, normalize_for_threshold, requires_health_canada_reporting,
    should_auto_report, DetectionThresholds, IncidentType, InvestigationStatus, LossTheftReport,
    ProductCategory, UnitOfMeasure,
};

/// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn report_of(
    incident_type: IncidentType,
    category: ProductCategory,
    quantity_lost: Decimal,
    unit: UnitOfMeasure,
) -> LossTheftReport {
    let now = Utc::now();
    LossTheftReport {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        facility_id: Uuid::new_v4(),
        batch_id: Some(Uuid::new_v4()),
        incident_type,
        product_category: category,
        product_type: "Dried flower".to_string(),
        quantity_lost,
        unit,
        estimated_value: None,
        incident_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        discovered_date: NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
        location: Some("Vault A".to_string()),
        description: "Shortage found during cycle count".to_string(),
        investigation_status: InvestigationStatus::Open,
        investigation_notes: None,
        police_notified: false,
        police_report_number: None,
        reported_to_health_canada: false,
        hc_confirmation_number: None,
        hc_submitted_at: None,
        reported_by: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Detection Threshold Tests
// =============================================================================

mod detection_thresholds {
    use super::*;

    #[test]
    fn per_category_defaults() {
        let thresholds = DetectionThresholds::default();

        let dried = thresholds.threshold_for(ProductCategory::DriedCannabis);
        assert_eq!(dried.min_quantity, dec("250"));
        assert_eq!(dried.min_percentage, dec("2"));

        let seeds = thresholds.threshold_for(ProductCategory::Seeds);
        assert_eq!(seeds.min_quantity, dec("25"));

        let fresh = thresholds.threshold_for(ProductCategory::FreshCannabis);
        assert_eq!(fresh.min_quantity, dec("1000"));
    }

    #[test]
    fn configured_fallback_leaves_listed_categories_alone() {
        let thresholds = DetectionThresholds::with_fallback(dec("50"), dec("1"));

        // Listed categories keep the standing table
        let dried = thresholds.threshold_for(ProductCategory::DriedCannabis);
        assert_eq!(dried.min_quantity, dec("250"));
        assert_eq!(dried.min_percentage, dec("2"));
    }

    #[test]
    fn quantity_trigger_at_threshold() {
        let thresholds = DetectionThresholds::default();

        // 250 g of dried cannabis at a negligible percentage still triggers
        assert!(should_auto_report(
            ProductCategory::DriedCannabis,
            dec("250"),
            dec("0.5"),
            UnitOfMeasure::Grams,
            &thresholds,
        ));

        assert!(!should_auto_report(
            ProductCategory::DriedCannabis,
            dec("249"),
            dec("0.5"),
            UnitOfMeasure::Grams,
            &thresholds,
        ));
    }

    #[test]
    fn percentage_trigger_for_small_quantities() {
        let thresholds = DetectionThresholds::default();

        // 10 g is far below the quantity trigger, but 2% of the batch
        assert!(should_auto_report(
            ProductCategory::DriedCannabis,
            dec("10"),
            dec("2"),
            UnitOfMeasure::Grams,
            &thresholds,
        ));

        assert!(!should_auto_report(
            ProductCategory::DriedCannabis,
            dec("10"),
            dec("1.9"),
            UnitOfMeasure::Grams,
            &thresholds,
        ));
    }

    #[test]
    fn kilogram_shortages_compare_in_grams() {
        let thresholds = DetectionThresholds::default();

        // 0.25 kg == 250 g: meets the dried cannabis quantity trigger
        assert!(should_auto_report(
            ProductCategory::DriedCannabis,
            dec("0.25"),
            dec("0.5"),
            UnitOfMeasure::Kilograms,
            &thresholds,
        ));

        assert!(!should_auto_report(
            ProductCategory::DriedCannabis,
            dec("0.2"),
            dec("0.5"),
            UnitOfMeasure::Kilograms,
            &thresholds,
        ));
    }

    #[test]
    fn count_categories_compare_in_units() {
        let thresholds = DetectionThresholds::default();

        assert!(should_auto_report(
            ProductCategory::Seeds,
            dec("25"),
            dec("1"),
            UnitOfMeasure::Units,
            &thresholds,
        ));

        assert!(!should_auto_report(
            ProductCategory::Seeds,
            dec("24"),
            dec("1"),
            UnitOfMeasure::Units,
            &thresholds,
        ));
    }

    #[test]
    fn overages_and_zero_shortages_never_trigger() {
        let thresholds = DetectionThresholds::default();

        assert!(!should_auto_report(
            ProductCategory::DriedCannabis,
            Decimal::ZERO,
            dec("100"),
            UnitOfMeasure::Grams,
            &thresholds,
        ));

        assert!(!should_auto_report(
            ProductCategory::DriedCannabis,
            dec("-50"),
            dec("-10"),
            UnitOfMeasure::Grams,
            &thresholds,
        ));
    }
}

// =============================================================================
// Health Canada Reporting Tests
// =============================================================================

mod health_canada_reporting {
    use super::*;

    #[test]
    fn threshold_table_values() {
        assert_eq!(
            hc_reporting_threshold(ProductCategory::DriedCannabis),
            dec("1000")
        );
        assert_eq!(hc_reporting_threshold(ProductCategory::Seeds), dec("50"));
        assert_eq!(
            hc_reporting_threshold(ProductCategory::FreshCannabis),
            dec("5000")
        );
        assert_eq!(
            hc_reporting_threshold(ProductCategory::Topicals),
            dec("2000")
        );
    }

    #[test]
    fn theft_is_always_reportable() {
        let report = report_of(
            IncidentType::Theft,
            ProductCategory::DriedCannabis,
            dec("1"),
            UnitOfMeasure::Grams,
        );
        assert!(requires_health_canada_reporting(&report));
    }

    #[test]
    fn loss_reportable_at_threshold() {
        let report = report_of(
            IncidentType::Loss,
            ProductCategory::DriedCannabis,
            dec("1000"),
            UnitOfMeasure::Grams,
        );
        assert!(requires_health_canada_reporting(&report));

        let report = report_of(
            IncidentType::Loss,
            ProductCategory::DriedCannabis,
            dec("999"),
            UnitOfMeasure::Grams,
        );
        assert!(!requires_health_canada_reporting(&report));
    }

    #[test]
    fn loss_quantity_normalized_before_comparison() {
        // 1 kg of dried cannabis is 1000 g: exactly at the threshold
        let report = report_of(
            IncidentType::Loss,
            ProductCategory::DriedCannabis,
            dec("1"),
            UnitOfMeasure::Kilograms,
        );
        assert!(requires_health_canada_reporting(&report));

        let report = report_of(
            IncidentType::Loss,
            ProductCategory::DriedCannabis,
            dec("0.999"),
            UnitOfMeasure::Kilograms,
        );
        assert!(!requires_health_canada_reporting(&report));
    }

    #[test]
    fn count_category_loss_compares_in_units() {
        let report = report_of(
            IncidentType::Loss,
            ProductCategory::Seeds,
            dec("50"),
            UnitOfMeasure::Units,
        );
        assert!(requires_health_canada_reporting(&report));

        let report = report_of(
            IncidentType::Loss,
            ProductCategory::Seeds,
            dec("49"),
            UnitOfMeasure::Units,
        );
        assert!(!requires_health_canada_reporting(&report));
    }

    #[test]
    fn submission_freezes_via_flag() {
        let mut report = report_of(
            IncidentType::Loss,
            ProductCategory::DriedCannabis,
            dec("1000"),
            UnitOfMeasure::Grams,
        );
        assert!(!report.is_submitted());

        report.reported_to_health_canada = true;
        assert!(report.is_submitted());
    }
}

// =============================================================================
// Enum Round-Trip Tests
// =============================================================================

mod incident_enums {
    use super::*;

    #[test]
    fn incident_type_round_trip() {
        for incident_type in [IncidentType::Loss, IncidentType::Theft] {
            assert_eq!(
                IncidentType::from_str(incident_type.as_str()),
                Some(incident_type)
            );
        }
        assert_eq!(IncidentType::from_str("misplaced"), None);
    }

    #[test]
    fn investigation_status_round_trip() {
        for status in [
            InvestigationStatus::Open,
            InvestigationStatus::UnderInvestigation,
            InvestigationStatus::Closed,
        ] {
            assert_eq!(
                InvestigationStatus::from_str(status.as_str()),
                Some(status)
            );
        }
        assert_eq!(InvestigationStatus::from_str("pending"), None);
    }
}

// =============================================================================
// Property-Based Tests
// =============================================================================

mod property_tests {
    use super::*;

    fn category_strategy() -> impl Strategy<Value = ProductCategory> {
        (0usize..ProductCategory::ALL.len()).prop_map(|i| ProductCategory::ALL[i])
    }

    fn mass_unit_strategy() -> impl Strategy<Value = UnitOfMeasure> {
        prop_oneof![
            Just(UnitOfMeasure::Milligrams),
            Just(UnitOfMeasure::Grams),
            Just(UnitOfMeasure::Kilograms),
        ]
    }

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=10_000_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Non-positive shortages never open a report, whatever the
        /// percentage says
        #[test]
        fn prop_non_positive_shortage_never_triggers(
            category in category_strategy(),
            shortage in (0i64..=100_000i64).prop_map(|n| Decimal::new(-n, 2)),
            percentage in (0i64..=10_000i64).prop_map(|n| Decimal::new(n, 2))
        ) {
            let thresholds = DetectionThresholds::default();
            prop_assert!(!should_auto_report(
                category,
                shortage,
                percentage,
                UnitOfMeasure::Grams,
                &thresholds,
            ));
        }

        /// Detection triggers exactly when either trigger is met in
        /// normalized units
        #[test]
        fn prop_detection_is_quantity_or_percentage(
            category in category_strategy(),
            shortage in quantity_strategy(),
            percentage in (0i64..=10_000i64).prop_map(|n| Decimal::new(n, 2)),
            unit in mass_unit_strategy()
        ) {
            let thresholds = DetectionThresholds::default();
            let threshold = thresholds.threshold_for(category);

            let expected = normalize_for_threshold(shortage, unit) >= threshold.min_quantity
                || percentage >= threshold.min_percentage;

            prop_assert_eq!(
                should_auto_report(category, shortage, percentage, unit, &thresholds),
                expected
            );
        }

        /// Theft incidents are reportable at any quantity
        #[test]
        fn prop_theft_always_reportable(
            category in category_strategy(),
            quantity in quantity_strategy()
        ) {
            let unit = match category.unit_class() {
                shared::UnitClass::Count => UnitOfMeasure::Units,
                shared::UnitClass::Mass => UnitOfMeasure::Grams,
            };
            let report = report_of(IncidentType::Theft, category, quantity, unit);
            prop_assert!(requires_health_canada_reporting(&report));
        }

        /// Loss reportability is the normalized comparison against the fixed
        /// table
        #[test]
        fn prop_loss_reportability_matches_table(
            category in category_strategy(),
            quantity in quantity_strategy(),
            unit in mass_unit_strategy()
        ) {
            // Mass units only: count categories carry `units` by
            // construction elsewhere
            if category.unit_class() == shared::UnitClass::Count {
                return Ok(());
            }

            let report = report_of(IncidentType::Loss, category, quantity, unit);
            let expected =
                normalize_for_threshold(quantity, unit) >= hc_reporting_threshold(category);

            prop_assert_eq!(requires_health_canada_reporting(&report), expected);
        }

        /// Every category resolves to some detection threshold
        #[test]
        fn prop_every_category_has_threshold(category in category_strategy()) {
            let thresholds = DetectionThresholds::default();
            let threshold = thresholds.threshold_for(category);

            prop_assert!(threshold.min_quantity > Decimal::ZERO);
            prop_assert!(threshold.min_percentage > Decimal::ZERO);
        }
    }
}
