//! Traceability ledger tests
//!
//! Covers the event type taxonomy, the signed quantity effect of each event
//! type, and projection consistency: a batch's current quantity must always
//! equal its creation quantity plus the signed sum of its ledger events.

use proptest::prelude::*;
use rust_decimal::Decimal;

use shared::{replay_quantity, signed_effect, EventType};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn fifteen_event_types_exist() {
        assert_eq!(EventType::ALL.len(), 15);
    }

    #[test]
    fn event_type_string_round_trip() {
        for event_type in EventType::ALL {
            assert_eq!(EventType::from_str(event_type.as_str()), Some(event_type));
        }
        assert_eq!(EventType::from_str("teleport"), None);
    }

    #[test]
    fn additive_events() {
        assert_eq!(EventType::Harvest.effect_sign(), 1);
        assert_eq!(EventType::Delivery.effect_sign(), 1);
    }

    #[test]
    fn deductive_events() {
        for event_type in [
            EventType::Split,
            EventType::AdjustmentLoss,
            EventType::Destruction,
            EventType::LossTheft,
            EventType::OrderFulfillment,
            EventType::Shipment,
        ] {
            assert_eq!(event_type.effect_sign(), -1, "{} must deduct", event_type);
        }
    }

    #[test]
    fn neutral_events() {
        // Processing records the pre-process amount; the yield loss travels
        // in its paired adjustment_loss event.
        for event_type in [
            EventType::Processing,
            EventType::Movement,
            EventType::Archive,
            EventType::Restore,
            EventType::Recall,
            EventType::RecallRemoved,
            EventType::StatusChange,
        ] {
            assert_eq!(event_type.effect_sign(), 0, "{} must be neutral", event_type);
        }
    }

    #[test]
    fn signed_effect_without_quantity_is_zero() {
        for event_type in EventType::ALL {
            assert_eq!(signed_effect(event_type, None), Decimal::ZERO);
        }
    }

    #[test]
    fn signed_effect_applies_direction() {
        assert_eq!(
            signed_effect(EventType::Harvest, Some(dec("25.5"))),
            dec("25.5")
        );
        assert_eq!(
            signed_effect(EventType::Shipment, Some(dec("25.5"))),
            dec("-25.5")
        );
        assert_eq!(
            signed_effect(EventType::Movement, Some(dec("25.5"))),
            Decimal::ZERO
        );
    }

    #[test]
    fn replay_of_empty_ledger_is_initial_quantity() {
        assert_eq!(replay_quantity(dec("100"), &[]), dec("100"));
    }

    /// A 100 g batch: split 30 out, process the remainder down to 60 with a
    /// 10 g yield loss. The ledger replays to 60.
    #[test]
    fn replay_split_then_process() {
        let events = [
            (EventType::Split, Some(dec("30"))),
            (EventType::Processing, Some(dec("70"))),
            (EventType::AdjustmentLoss, Some(dec("10"))),
        ];

        assert_eq!(replay_quantity(dec("100"), &events), dec("60"));
    }

    #[test]
    fn replay_full_disposition_reaches_zero() {
        let events = [
            (EventType::Harvest, Some(dec("40"))),
            (EventType::OrderFulfillment, Some(dec("90"))),
            (EventType::Shipment, Some(dec("30"))),
            (EventType::Destruction, Some(dec("20"))),
        ];

        assert_eq!(replay_quantity(dec("100"), &events), Decimal::ZERO);
    }

    #[test]
    fn replay_ignores_state_events() {
        let events = [
            (EventType::Recall, None),
            (EventType::StatusChange, None),
            (EventType::Movement, Some(dec("100"))),
            (EventType::RecallRemoved, None),
        ];

        assert_eq!(replay_quantity(dec("100"), &events), dec("100"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn event_type_strategy() -> impl Strategy<Value = EventType> {
        (0usize..EventType::ALL.len()).prop_map(|i| EventType::ALL[i])
    }

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=100_000i64).prop_map(|n| Decimal::new(n, 2)) // 0.01 to 1000.00
    }

    fn ledger_strategy() -> impl Strategy<Value = Vec<(EventType, Option<Decimal>)>> {
        prop::collection::vec(
            (event_type_strategy(), prop::option::of(quantity_strategy())),
            0..30,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Projection consistency: replay equals initial plus the signed sum
        /// of every event effect
        #[test]
        fn prop_replay_is_signed_sum(
            initial in quantity_strategy(),
            events in ledger_strategy()
        ) {
            let replayed = replay_quantity(initial, &events);
            let signed_sum: Decimal = events
                .iter()
                .map(|(event_type, quantity)| signed_effect(*event_type, *quantity))
                .sum();

            prop_assert_eq!(replayed, initial + signed_sum);
        }

        /// Appending one event moves the projection by exactly its signed
        /// effect
        #[test]
        fn prop_append_moves_projection_by_effect(
            initial in quantity_strategy(),
            events in ledger_strategy(),
            next_type in event_type_strategy(),
            next_quantity in prop::option::of(quantity_strategy())
        ) {
            let before = replay_quantity(initial, &events);

            let mut extended = events.clone();
            extended.push((next_type, next_quantity));
            let after = replay_quantity(initial, &extended);

            prop_assert_eq!(after - before, signed_effect(next_type, next_quantity));
        }

        /// Additive-only ledgers never shrink the projection
        #[test]
        fn prop_additive_ledger_never_shrinks(
            initial in quantity_strategy(),
            quantities in prop::collection::vec(quantity_strategy(), 0..20)
        ) {
            let events: Vec<(EventType, Option<Decimal>)> = quantities
                .iter()
                .map(|q| (EventType::Harvest, Some(*q)))
                .collect();

            prop_assert!(replay_quantity(initial, &events) >= initial);
        }

        /// Quantity-less events never move the projection
        #[test]
        fn prop_quantity_less_events_are_inert(
            initial in quantity_strategy(),
            types in prop::collection::vec(event_type_strategy(), 0..20)
        ) {
            let events: Vec<(EventType, Option<Decimal>)> =
                types.into_iter().map(|t| (t, None)).collect();

            prop_assert_eq!(replay_quantity(initial, &events), initial);
        }

        /// The signed effect of each event type matches its declared sign
        #[test]
        fn prop_effect_matches_sign(
            event_type in event_type_strategy(),
            quantity in quantity_strategy()
        ) {
            let effect = signed_effect(event_type, Some(quantity));
            match event_type.effect_sign() {
                1 => prop_assert_eq!(effect, quantity),
                -1 => prop_assert_eq!(effect, -quantity),
                _ => prop_assert_eq!(effect, Decimal::ZERO),
            }
        }
    }
}
