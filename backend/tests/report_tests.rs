//! Regulatory report generation tests
//!
//! The monthly inventory schema is parsed by position downstream, so these
//! tests pin the column count, the column order, and the cell formatting as
//! well as the event-to-column mapping.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{
    build_disposition_report, build_monthly_inventory, build_production_report, format_cell,
    metric_for_event, monthly_inventory_headers, EventType, InventoryMetric,
    InventorySnapshotRecord, LedgerEventRecord, PackagedState, ProductCategory, ReportDocument,
    ReportMetadata, ReportType, UnitClass, UnitOfMeasure,
};

/// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn meta() -> ReportMetadata {
    ReportMetadata {
        licence_number: "LIC-2024-00123".to_string(),
        facility_name: "Niagara Production Site".to_string(),
        address: "100 Greenhouse Road".to_string(),
        city: "Niagara-on-the-Lake".to_string(),
        province: "ON".to_string(),
        postal_code: "L0S 1J0".to_string(),
        period_year: 2024,
        period_month: 3,
    }
}

fn snapshot(
    category: ProductCategory,
    is_packaged: bool,
    quantity: Decimal,
    unit: UnitOfMeasure,
) -> InventorySnapshotRecord {
    InventorySnapshotRecord {
        category,
        is_packaged,
        quantity,
        unit,
    }
}

fn event(
    event_type: EventType,
    category: ProductCategory,
    quantity: Option<Decimal>,
    unit: Option<UnitOfMeasure>,
) -> LedgerEventRecord {
    LedgerEventRecord {
        event_type,
        occurred_at: Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap(),
        batch_code: "CCP-2024-NIA-0001".to_string(),
        product_type: "Pink Kush".to_string(),
        category,
        is_packaged: false,
        quantity,
        unit,
        from_location: None,
        to_location: None,
        description: None,
        recorded_by: Uuid::new_v4(),
    }
}

fn cell<'a>(document: &'a ReportDocument, column: &str) -> &'a str {
    let idx = document
        .headers
        .iter()
        .position(|h| h == column)
        .unwrap_or_else(|| panic!("no column named {}", column));
    &document.rows[0][idx]
}

// =============================================================================
// Schema Tests
// =============================================================================

mod monthly_schema {
    use super::*;

    #[test]
    fn column_count_is_fixed() {
        // 8 metadata columns + 2 packaged states x 12 categories x 11 metrics
        let headers = monthly_inventory_headers();
        assert_eq!(headers.len(), 8 + 2 * 12 * 11);
        assert_eq!(headers.len(), 272);
    }

    #[test]
    fn metadata_columns_lead() {
        let headers = monthly_inventory_headers();
        assert_eq!(headers[0], "licence_number");
        assert_eq!(headers[1], "facility_name");
        assert_eq!(headers[5], "postal_code");
        assert_eq!(headers[6], "period_year");
        assert_eq!(headers[7], "period_month");
    }

    #[test]
    fn unpackaged_block_precedes_packaged() {
        let headers = monthly_inventory_headers();
        assert_eq!(headers[8], "unpackaged_seeds_opening_inventory");
        // 12 categories x 11 metrics later the packaged block begins
        assert_eq!(headers[8 + 132], "packaged_seeds_opening_inventory");
        assert_eq!(headers[271], "packaged_topicals_closing_inventory");
    }

    #[test]
    fn eleven_metrics_per_category() {
        let headers = monthly_inventory_headers();
        // The first category occupies indexes 8..19 and the next one starts
        // right after
        assert_eq!(headers[8 + 10], "unpackaged_seeds_closing_inventory");
        assert_eq!(headers[8 + 11], "unpackaged_vegetative_plants_opening_inventory");
    }

    #[test]
    fn headers_are_unique() {
        let headers = monthly_inventory_headers();
        let unique: std::collections::HashSet<&String> = headers.iter().collect();
        assert_eq!(unique.len(), headers.len());
    }

    #[test]
    fn headers_stable_between_calls() {
        assert_eq!(monthly_inventory_headers(), monthly_inventory_headers());
    }

    #[test]
    fn report_type_string_round_trip() {
        for report_type in [
            ReportType::MonthlyInventory,
            ReportType::Production,
            ReportType::Disposition,
        ] {
            assert_eq!(ReportType::from_str(report_type.as_str()), Some(report_type));
        }
        assert_eq!(ReportType::from_str("annual"), None);
    }
}

// =============================================================================
// Cell Formatting Tests
// =============================================================================

mod cell_formatting {
    use super::*;

    #[test]
    fn mass_cells_carry_four_decimals() {
        assert_eq!(format_cell(dec("1.5"), UnitClass::Mass), "1.5000");
        assert_eq!(format_cell(Decimal::ZERO, UnitClass::Mass), "0.0000");
        assert_eq!(format_cell(dec("0.12346"), UnitClass::Mass), "0.1235");
    }

    #[test]
    fn count_cells_are_whole() {
        assert_eq!(format_cell(dec("25"), UnitClass::Count), "25");
        assert_eq!(format_cell(Decimal::ZERO, UnitClass::Count), "0");
    }
}

// =============================================================================
// Event-to-Column Mapping Tests
// =============================================================================

mod metric_mapping {
    use super::*;

    #[test]
    fn quantity_events_map_to_their_columns() {
        assert_eq!(
            metric_for_event(EventType::Harvest),
            Some(InventoryMetric::Produced)
        );
        assert_eq!(
            metric_for_event(EventType::Delivery),
            Some(InventoryMetric::Received)
        );
        assert_eq!(
            metric_for_event(EventType::Processing),
            Some(InventoryMetric::Processed)
        );
        assert_eq!(
            metric_for_event(EventType::Shipment),
            Some(InventoryMetric::ShippedDomestic)
        );
        assert_eq!(
            metric_for_event(EventType::OrderFulfillment),
            Some(InventoryMetric::ShippedDomestic)
        );
        assert_eq!(
            metric_for_event(EventType::Destruction),
            Some(InventoryMetric::Destroyed)
        );
        assert_eq!(
            metric_for_event(EventType::LossTheft),
            Some(InventoryMetric::LostStolen)
        );
        assert_eq!(
            metric_for_event(EventType::AdjustmentLoss),
            Some(InventoryMetric::OtherReductions)
        );
    }

    #[test]
    fn state_events_map_to_no_column() {
        for event_type in [
            EventType::Split,
            EventType::Movement,
            EventType::Archive,
            EventType::Restore,
            EventType::Recall,
            EventType::RecallRemoved,
            EventType::StatusChange,
        ] {
            assert_eq!(metric_for_event(event_type), None, "{}", event_type);
        }
    }

    #[test]
    fn mapping_covers_the_full_taxonomy() {
        let mapped = EventType::ALL
            .iter()
            .filter(|e| metric_for_event(**e).is_some())
            .count();
        assert_eq!(mapped, 8);
        assert_eq!(EventType::ALL.len() - mapped, 7);
    }
}

// =============================================================================
// Monthly Inventory Aggregation Tests
// =============================================================================

mod monthly_inventory {
    use super::*;

    /// A facility with no batches and no events produces one row of zeros
    /// under correct metadata.
    #[test]
    fn empty_facility_yields_one_zero_row() {
        let document = build_monthly_inventory(&meta(), &[], &[], &[]);

        assert_eq!(document.rows.len(), 1);
        let row = &document.rows[0];
        assert_eq!(row.len(), document.headers.len());

        assert_eq!(row[0], "LIC-2024-00123");
        assert_eq!(row[6], "2024");
        assert_eq!(row[7], "3");

        let mut idx = 8;
        for _state in PackagedState::ALL {
            for category in ProductCategory::ALL {
                let expected = match category.unit_class() {
                    UnitClass::Count => "0",
                    UnitClass::Mass => "0.0000",
                };
                for _metric in InventoryMetric::ALL {
                    assert_eq!(row[idx], expected, "column {}", document.headers[idx]);
                    idx += 1;
                }
            }
        }
    }

    #[test]
    fn snapshots_fill_opening_and_closing_cells() {
        let opening = [snapshot(
            ProductCategory::DriedCannabis,
            false,
            dec("1500"),
            UnitOfMeasure::Grams,
        )];
        let closing = [
            snapshot(
                ProductCategory::DriedCannabis,
                false,
                dec("1200"),
                UnitOfMeasure::Grams,
            ),
            snapshot(
                ProductCategory::DriedCannabis,
                true,
                dec("0.3"),
                UnitOfMeasure::Kilograms,
            ),
        ];

        let document = build_monthly_inventory(&meta(), &opening, &closing, &[]);

        assert_eq!(
            cell(&document, "unpackaged_dried_cannabis_opening_inventory"),
            "1.5000"
        );
        assert_eq!(
            cell(&document, "unpackaged_dried_cannabis_closing_inventory"),
            "1.2000"
        );
        assert_eq!(
            cell(&document, "packaged_dried_cannabis_closing_inventory"),
            "0.3000"
        );
        // Untouched cells stay zero
        assert_eq!(
            cell(&document, "packaged_dried_cannabis_opening_inventory"),
            "0.0000"
        );
    }

    #[test]
    fn same_cell_snapshots_accumulate() {
        let opening = [
            snapshot(
                ProductCategory::Seeds,
                false,
                dec("40"),
                UnitOfMeasure::Units,
            ),
            snapshot(
                ProductCategory::Seeds,
                false,
                dec("60"),
                UnitOfMeasure::Units,
            ),
        ];

        let document = build_monthly_inventory(&meta(), &opening, &[], &[]);
        assert_eq!(cell(&document, "unpackaged_seeds_opening_inventory"), "100");
    }

    #[test]
    fn events_land_in_their_metric_columns() {
        let events = [
            event(
                EventType::Harvest,
                ProductCategory::FreshCannabis,
                Some(dec("2000")),
                Some(UnitOfMeasure::Grams),
            ),
            event(
                EventType::Destruction,
                ProductCategory::FreshCannabis,
                Some(dec("500")),
                Some(UnitOfMeasure::Grams),
            ),
        ];

        let document = build_monthly_inventory(&meta(), &[], &[], &events);

        assert_eq!(
            cell(&document, "unpackaged_fresh_cannabis_quantity_produced"),
            "2.0000"
        );
        assert_eq!(
            cell(&document, "unpackaged_fresh_cannabis_quantity_destroyed"),
            "0.5000"
        );
    }

    /// Split and movement events carry no regulatory meaning and leave the
    /// movement columns untouched.
    #[test]
    fn state_events_are_ignored() {
        let events = [
            event(
                EventType::Split,
                ProductCategory::DriedCannabis,
                Some(dec("30")),
                Some(UnitOfMeasure::Grams),
            ),
            event(
                EventType::Movement,
                ProductCategory::DriedCannabis,
                Some(dec("60")),
                Some(UnitOfMeasure::Grams),
            ),
        ];

        let document = build_monthly_inventory(&meta(), &[], &[], &events);
        let row = &document.rows[0];

        for (idx, value) in row.iter().enumerate().skip(8) {
            assert!(
                value == "0" || value == "0.0000",
                "column {} unexpectedly {}",
                document.headers[idx],
                value
            );
        }
    }

    /// The canonical 100 g scenario: the split is invisible to the
    /// regulator, processing reports the pre-process amount, and the yield
    /// loss lands in other reductions.
    #[test]
    fn split_process_scenario_cells() {
        let events = [
            event(
                EventType::Split,
                ProductCategory::DriedCannabis,
                Some(dec("30")),
                Some(UnitOfMeasure::Grams),
            ),
            event(
                EventType::Processing,
                ProductCategory::DriedCannabis,
                Some(dec("70")),
                Some(UnitOfMeasure::Grams),
            ),
            event(
                EventType::AdjustmentLoss,
                ProductCategory::DriedCannabis,
                Some(dec("10")),
                Some(UnitOfMeasure::Grams),
            ),
        ];

        let document = build_monthly_inventory(&meta(), &[], &[], &events);

        assert_eq!(
            cell(&document, "unpackaged_dried_cannabis_quantity_processed"),
            "0.0700"
        );
        assert_eq!(
            cell(&document, "unpackaged_dried_cannabis_other_reductions"),
            "0.0100"
        );
    }
}

// =============================================================================
// Production Report Tests
// =============================================================================

mod production_report {
    use super::*;

    #[test]
    fn only_harvest_and_processing_rows() {
        let events = [
            event(
                EventType::Harvest,
                ProductCategory::FreshCannabis,
                Some(dec("2500")),
                Some(UnitOfMeasure::Grams),
            ),
            event(
                EventType::Destruction,
                ProductCategory::FreshCannabis,
                Some(dec("100")),
                Some(UnitOfMeasure::Grams),
            ),
            event(
                EventType::Processing,
                ProductCategory::DriedCannabis,
                Some(dec("400")),
                Some(UnitOfMeasure::Grams),
            ),
        ];

        let document = build_production_report(&meta(), &events);

        assert_eq!(document.headers.len(), 10);
        assert_eq!(document.rows.len(), 2);
        assert_eq!(document.rows[0][2], "harvest");
        assert_eq!(document.rows[1][2], "processing");
    }

    #[test]
    fn row_content() {
        let events = [event(
            EventType::Harvest,
            ProductCategory::FreshCannabis,
            Some(dec("2500")),
            Some(UnitOfMeasure::Grams),
        )];

        let document = build_production_report(&meta(), &events);
        let row = &document.rows[0];

        assert_eq!(row[0], "LIC-2024-00123");
        assert_eq!(row[1], "2024-03-15");
        assert_eq!(row[3], "CCP-2024-NIA-0001");
        assert_eq!(row[5], "fresh_cannabis");
        assert_eq!(row[6], "2500");
        assert_eq!(row[7], "g");
        // Normalized to kilograms
        assert_eq!(row[8], "2.5000");
    }

    #[test]
    fn empty_range_keeps_headers() {
        let document = build_production_report(&meta(), &[]);
        assert_eq!(document.headers.len(), 10);
        assert!(document.rows.is_empty());
    }
}

// =============================================================================
// Disposition Report Tests
// =============================================================================

mod disposition_report {
    use super::*;

    #[test]
    fn only_disposition_event_rows() {
        let events = [
            event(
                EventType::Movement,
                ProductCategory::DriedCannabis,
                Some(dec("60")),
                Some(UnitOfMeasure::Grams),
            ),
            event(
                EventType::Harvest,
                ProductCategory::FreshCannabis,
                Some(dec("2500")),
                Some(UnitOfMeasure::Grams),
            ),
            event(
                EventType::LossTheft,
                ProductCategory::DriedCannabis,
                Some(dec("5")),
                Some(UnitOfMeasure::Grams),
            ),
        ];

        let document = build_disposition_report(&meta(), &events);

        assert_eq!(document.headers.len(), 13);
        assert_eq!(document.rows.len(), 2);
        assert_eq!(document.rows[0][2], "movement");
        assert_eq!(document.rows[1][2], "loss_theft");
    }

    #[test]
    fn locations_and_reason_populate() {
        let mut destruction = event(
            EventType::Destruction,
            ProductCategory::DriedCannabis,
            Some(dec("20")),
            Some(UnitOfMeasure::Grams),
        );
        destruction.from_location = Some("Vault A".to_string());
        destruction.to_location = Some("Incinerator".to_string());
        destruction.description = Some("Incineration: failed potency test".to_string());

        let document = build_disposition_report(&meta(), &[destruction]);
        let row = &document.rows[0];

        assert_eq!(row[9], "Vault A");
        assert_eq!(row[10], "Incinerator");
        assert_eq!(row[11], "Incineration: failed potency test");
    }

    #[test]
    fn quantity_less_event_leaves_cells_empty() {
        let document = build_disposition_report(
            &meta(),
            &[event(EventType::Movement, ProductCategory::DriedCannabis, None, None)],
        );
        let row = &document.rows[0];

        assert_eq!(row[6], "");
        assert_eq!(row[7], "");
        assert_eq!(row[8], "");
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

    fn event_type_strategy() -> impl Strategy<Value = EventType> {
        (0usize..EventType::ALL.len()).prop_map(|i| EventType::ALL[i])
    }

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    fn event_strategy() -> impl Strategy<Value = LedgerEventRecord> {
        (event_type_strategy(), category_strategy(), quantity_strategy(), any::<bool>()).prop_map(
            |(event_type, category, quantity, is_packaged)| {
                let unit = match category.unit_class() {
                    UnitClass::Count => UnitOfMeasure::Units,
                    UnitClass::Mass => UnitOfMeasure::Grams,
                };
                let mut record = event(event_type, category, Some(quantity), Some(unit));
                record.is_packaged = is_packaged;
                record
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The monthly inventory row always matches the fixed schema width
        #[test]
        fn prop_monthly_row_matches_schema(
            events in prop::collection::vec(event_strategy(), 0..25)
        ) {
            let document = build_monthly_inventory(&meta(), &[], &[], &events);

            prop_assert_eq!(document.rows.len(), 1);
            prop_assert_eq!(document.headers.len(), 272);
            prop_assert_eq!(document.rows[0].len(), 272);
        }

        /// Every numeric cell parses as a non-negative decimal
        #[test]
        fn prop_monthly_cells_parse(
            events in prop::collection::vec(event_strategy(), 0..25)
        ) {
            let document = build_monthly_inventory(&meta(), &[], &[], &events);

            for value in document.rows[0].iter().skip(8) {
                let parsed: Decimal = value.parse().unwrap();
                prop_assert!(parsed >= Decimal::ZERO);
            }
        }

        /// Listing reports copy the quantity through and normalize mass to
        /// kilograms
        #[test]
        fn prop_production_rows_filtered_and_sized(
            events in prop::collection::vec(event_strategy(), 0..25)
        ) {
            let document = build_production_report(&meta(), &events);

            let expected = events
                .iter()
                .filter(|e| matches!(e.event_type, EventType::Harvest | EventType::Processing))
                .count();

            prop_assert_eq!(document.rows.len(), expected);
            for row in &document.rows {
                prop_assert_eq!(row.len(), 10);
            }
        }

        /// Disposition rows keep exactly the disposition event types
        #[test]
        fn prop_disposition_rows_filtered_and_sized(
            events in prop::collection::vec(event_strategy(), 0..25)
        ) {
            let document = build_disposition_report(&meta(), &events);

            let expected = events
                .iter()
                .filter(|e| matches!(
                    e.event_type,
                    EventType::Movement | EventType::Destruction | EventType::LossTheft
                ))
                .count();

            prop_assert_eq!(document.rows.len(), expected);
            for row in &document.rows {
                prop_assert_eq!(row.len(), 13);
            }
        }
    }
}
