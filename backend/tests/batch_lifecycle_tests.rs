//! Batch lifecycle state machine tests
//!
//! Covers the transition table (terminal states are absorbing, no
//! self-transitions), the flag derivation for archive/quarantine
//! transitions, and batch code generation.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{
    derive_flags, generate_batch_code, Batch, BatchStatus, FlagChanges, ProductCategory,
    UnitOfMeasure,
};

/// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn sample_batch(status: BatchStatus) -> Batch {
    let now = Utc::now();
    Batch {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        facility_id: Uuid::new_v4(),
        cultivation_area_id: Some(Uuid::new_v4()),
        parent_batch_id: None,
        batch_code: "CCP-2024-NIA-0001".to_string(),
        name: "Mother room intake".to_string(),
        product_type: "Pink Kush".to_string(),
        product_category: ProductCategory::DriedCannabis,
        variety: Some("Pink Kush".to_string()),
        end_type: None,
        initial_units: dec("100"),
        current_units: dec("100"),
        unit: UnitOfMeasure::Grams,
        is_packaged: false,
        sub_location: Some("Vault A".to_string()),
        status,
        is_archived: false,
        archived_at: None,
        archive_reason: None,
        is_recalled: false,
        recalled_at: None,
        recalled_by: None,
        recall_reason: None,
        created_by: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Transition Table Tests
// =============================================================================

mod transition_table {
    use super::*;

    #[test]
    fn eight_statuses_exist() {
        assert_eq!(BatchStatus::ALL.len(), 8);
    }

    #[test]
    fn destroyed_and_sold_are_terminal() {
        assert!(BatchStatus::Destroyed.is_terminal());
        assert!(BatchStatus::Sold.is_terminal());

        for status in [
            BatchStatus::Active,
            BatchStatus::OnHold,
            BatchStatus::Quarantine,
            BatchStatus::Released,
            BatchStatus::InTransit,
            BatchStatus::Archived,
        ] {
            assert!(!status.is_terminal(), "{} must not be terminal", status);
        }
    }

    #[test]
    fn non_terminal_states_are_mutually_reachable() {
        let non_terminal = [
            BatchStatus::Active,
            BatchStatus::OnHold,
            BatchStatus::Quarantine,
            BatchStatus::Released,
            BatchStatus::InTransit,
            BatchStatus::Archived,
        ];

        for from in non_terminal {
            for to in non_terminal {
                if from != to {
                    assert!(
                        from.can_transition_to(to),
                        "{} -> {} must be allowed",
                        from,
                        to
                    );
                }
            }
        }
    }

    #[test]
    fn non_terminal_states_can_enter_terminal() {
        assert!(BatchStatus::Active.can_transition_to(BatchStatus::Destroyed));
        assert!(BatchStatus::Released.can_transition_to(BatchStatus::Sold));
        assert!(BatchStatus::InTransit.can_transition_to(BatchStatus::Sold));
    }

    #[test]
    fn terminal_states_accept_no_exits() {
        for to in BatchStatus::ALL {
            assert!(!BatchStatus::Destroyed.can_transition_to(to));
            assert!(!BatchStatus::Sold.can_transition_to(to));
        }
    }

    #[test]
    fn no_self_transitions() {
        for status in BatchStatus::ALL {
            assert!(
                !status.can_transition_to(status),
                "{} -> {} must be rejected",
                status,
                status
            );
        }
    }

    #[test]
    fn terminal_batches_are_immutable() {
        assert!(!sample_batch(BatchStatus::Destroyed).is_mutable());
        assert!(!sample_batch(BatchStatus::Sold).is_mutable());
        assert!(sample_batch(BatchStatus::Active).is_mutable());
        assert!(sample_batch(BatchStatus::Quarantine).is_mutable());
    }

    #[test]
    fn status_string_round_trip() {
        for status in BatchStatus::ALL {
            assert_eq!(BatchStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(BatchStatus::from_str("composted"), None);
    }
}

// =============================================================================
// Flag Derivation Tests
// =============================================================================

mod flag_derivation {
    use super::*;

    #[test]
    fn entering_archived_sets_flag() {
        let changes = derive_flags(BatchStatus::Active, BatchStatus::Archived);
        assert_eq!(changes.set_archived, Some(true));
        assert_eq!(changes.set_recalled, None);
    }

    #[test]
    fn leaving_archived_clears_flag() {
        let changes = derive_flags(BatchStatus::Archived, BatchStatus::Active);
        assert_eq!(changes.set_archived, Some(false));
        assert_eq!(changes.set_recalled, None);
    }

    #[test]
    fn entering_quarantine_sets_recall_flag() {
        let changes = derive_flags(BatchStatus::Active, BatchStatus::Quarantine);
        assert_eq!(changes.set_recalled, Some(true));
        assert_eq!(changes.set_archived, None);
    }

    #[test]
    fn leaving_quarantine_clears_recall_flag() {
        let changes = derive_flags(BatchStatus::Quarantine, BatchStatus::Released);
        assert_eq!(changes.set_recalled, Some(false));
        assert_eq!(changes.set_archived, None);
    }

    #[test]
    fn archived_to_quarantine_touches_both_flags() {
        let changes = derive_flags(BatchStatus::Archived, BatchStatus::Quarantine);
        assert_eq!(changes.set_archived, Some(false));
        assert_eq!(changes.set_recalled, Some(true));
    }

    #[test]
    fn unrelated_transition_touches_nothing() {
        let changes = derive_flags(BatchStatus::Active, BatchStatus::OnHold);
        assert_eq!(changes, FlagChanges::default());

        let changes = derive_flags(BatchStatus::Released, BatchStatus::InTransit);
        assert_eq!(changes, FlagChanges::default());
    }

    #[test]
    fn terminal_entry_touches_no_flags() {
        assert_eq!(
            derive_flags(BatchStatus::Active, BatchStatus::Destroyed),
            FlagChanges::default()
        );
        assert_eq!(
            derive_flags(BatchStatus::Released, BatchStatus::Sold),
            FlagChanges::default()
        );
    }
}

// =============================================================================
// Batch Code Tests
// =============================================================================

mod batch_codes {
    use super::*;

    #[test]
    fn code_format() {
        assert_eq!(generate_batch_code("NIA", 2024, 1), "CCP-2024-NIA-0001");
        assert_eq!(generate_batch_code("BC7", 2025, 42), "CCP-2025-BC7-0042");
    }

    #[test]
    fn sequence_is_zero_padded_to_four() {
        assert_eq!(generate_batch_code("NIA", 2024, 7), "CCP-2024-NIA-0007");
        assert_eq!(generate_batch_code("NIA", 2024, 9999), "CCP-2024-NIA-9999");
    }

    #[test]
    fn sequence_above_padding_width_keeps_all_digits() {
        assert_eq!(generate_batch_code("NIA", 2024, 10001), "CCP-2024-NIA-10001");
    }
}

// =============================================================================
// Property-Based Tests
// =============================================================================

mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = BatchStatus> {
        (0usize..BatchStatus::ALL.len()).prop_map(|i| BatchStatus::ALL[i])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The transition table is exactly: non-terminal, and never to self
        #[test]
        fn prop_transition_table_shape(
            from in status_strategy(),
            to in status_strategy()
        ) {
            let allowed = from.can_transition_to(to);
            prop_assert_eq!(allowed, !from.is_terminal() && from != to);
        }

        /// The archive flag changes exactly when the archived status is
        /// entered or left
        #[test]
        fn prop_archive_flag_derivation(
            from in status_strategy(),
            to in status_strategy()
        ) {
            let changes = derive_flags(from, to);
            let entering = to == BatchStatus::Archived && from != BatchStatus::Archived;
            let leaving = from == BatchStatus::Archived && to != BatchStatus::Archived;

            if entering {
                prop_assert_eq!(changes.set_archived, Some(true));
            } else if leaving {
                prop_assert_eq!(changes.set_archived, Some(false));
            } else {
                prop_assert_eq!(changes.set_archived, None);
            }
        }

        /// The recall flag changes exactly when quarantine is entered or left
        #[test]
        fn prop_recall_flag_derivation(
            from in status_strategy(),
            to in status_strategy()
        ) {
            let changes = derive_flags(from, to);
            let entering = to == BatchStatus::Quarantine && from != BatchStatus::Quarantine;
            let leaving = from == BatchStatus::Quarantine && to != BatchStatus::Quarantine;

            if entering {
                prop_assert_eq!(changes.set_recalled, Some(true));
            } else if leaving {
                prop_assert_eq!(changes.set_recalled, Some(false));
            } else {
                prop_assert_eq!(changes.set_recalled, None);
            }
        }

        /// A no-op transition derives no flag changes
        #[test]
        fn prop_same_status_derives_nothing(status in status_strategy()) {
            prop_assert_eq!(derive_flags(status, status), FlagChanges::default());
        }

        /// Batch codes always carry four dash-separated parts with the
        /// CCP prefix
        #[test]
        fn prop_batch_code_structure(
            site in "[A-Z0-9]{3,10}",
            year in 2020i32..=2035,
            seq in 1i32..=9999
        ) {
            let code = generate_batch_code(&site, year, seq);
            let parts: Vec<&str> = code.split('-').collect();

            prop_assert_eq!(parts.len(), 4);
            prop_assert_eq!(parts[0], "CCP");
            prop_assert_eq!(parts[1], year.to_string());
            prop_assert_eq!(parts[2], site);
            prop_assert_eq!(parts[3].len(), 4);
            prop_assert!(parts[3].chars().all(|c| c.is_ascii_digit()));
        }

        /// Codes generated for the same site and year collide only when the
        /// sequence collides
        #[test]
        fn prop_batch_codes_unique_per_sequence(
            site in "[A-Z]{3}",
            year in 2020i32..=2035,
            seq1 in 1i32..=9999,
            seq2 in 1i32..=9999
        ) {
            let code1 = generate_batch_code(&site, year, seq1);
            let code2 = generate_batch_code(&site, year, seq2);

            if seq1 == seq2 {
                prop_assert_eq!(code1, code2);
            } else {
                prop_assert_ne!(code1, code2);
            }
        }
    }
}
