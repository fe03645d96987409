//! Traceability ledger events
//!
//! Events are append-only: written inside the transaction that performs the
//! causing mutation, and never updated or deleted afterwards. The ledger is
//! the authoritative record of quantity movement; a batch's `current_units`
//! must always equal its creation quantity plus the signed sum of the
//! effects of every event owned by it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UnitOfMeasure;

/// An immutable fact about a quantity or state change affecting a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceabilityEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub facility_id: Uuid,
    /// The batch this event belongs to
    pub batch_id: Uuid,
    /// For split events, the batch created by the split
    pub new_batch_id: Option<Uuid>,
    pub event_type: EventType,
    pub quantity: Option<Decimal>,
    pub unit: Option<UnitOfMeasure>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub from_sub_location: Option<String>,
    pub to_sub_location: Option<String>,
    pub description: Option<String>,
    /// External record this event was caused by (e.g., "order", "manifest")
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub user_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Closed set of ledger event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Split,
    Processing,
    AdjustmentLoss,
    Movement,
    Harvest,
    Destruction,
    LossTheft,
    OrderFulfillment,
    Shipment,
    Delivery,
    Archive,
    Restore,
    Recall,
    RecallRemoved,
    StatusChange,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        EventType::Split,
        EventType::Processing,
        EventType::AdjustmentLoss,
        EventType::Movement,
        EventType::Harvest,
        EventType::Destruction,
        EventType::LossTheft,
        EventType::OrderFulfillment,
        EventType::Shipment,
        EventType::Delivery,
        EventType::Archive,
        EventType::Restore,
        EventType::Recall,
        EventType::RecallRemoved,
        EventType::StatusChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Split => "split",
            EventType::Processing => "processing",
            EventType::AdjustmentLoss => "adjustment_loss",
            EventType::Movement => "movement",
            EventType::Harvest => "harvest",
            EventType::Destruction => "destruction",
            EventType::LossTheft => "loss_theft",
            EventType::OrderFulfillment => "order_fulfillment",
            EventType::Shipment => "shipment",
            EventType::Delivery => "delivery",
            EventType::Archive => "archive",
            EventType::Restore => "restore",
            EventType::Recall => "recall",
            EventType::RecallRemoved => "recall_removed",
            EventType::StatusChange => "status_change",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "split" => Some(EventType::Split),
            "processing" => Some(EventType::Processing),
            "adjustment_loss" => Some(EventType::AdjustmentLoss),
            "movement" => Some(EventType::Movement),
            "harvest" => Some(EventType::Harvest),
            "destruction" => Some(EventType::Destruction),
            "loss_theft" => Some(EventType::LossTheft),
            "order_fulfillment" => Some(EventType::OrderFulfillment),
            "shipment" => Some(EventType::Shipment),
            "delivery" => Some(EventType::Delivery),
            "archive" => Some(EventType::Archive),
            "restore" => Some(EventType::Restore),
            "recall" => Some(EventType::Recall),
            "recall_removed" => Some(EventType::RecallRemoved),
            "status_change" => Some(EventType::StatusChange),
            _ => None,
        }
    }

    /// Direction of the quantity effect on the owning batch: +1 additive,
    /// -1 deductive, 0 neutral. A `processing` event is neutral because it
    /// records the pre-process amount; the yield loss travels in its paired
    /// `adjustment_loss` event. A `split` event deducts from the source
    /// batch; the new batch starts at the split quantity, so the event adds
    /// nothing to it.
    pub fn effect_sign(&self) -> i8 {
        match self {
            EventType::Harvest | EventType::Delivery => 1,
            EventType::Split
            | EventType::AdjustmentLoss
            | EventType::Destruction
            | EventType::LossTheft
            | EventType::OrderFulfillment
            | EventType::Shipment => -1,
            EventType::Processing
            | EventType::Movement
            | EventType::Archive
            | EventType::Restore
            | EventType::Recall
            | EventType::RecallRemoved
            | EventType::StatusChange => 0,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signed quantity effect of an event on its owning batch. Events without a
/// quantity have no effect regardless of type.
pub fn signed_effect(event_type: EventType, quantity: Option<Decimal>) -> Decimal {
    let Some(quantity) = quantity else {
        return Decimal::ZERO;
    };
    match event_type.effect_sign() {
        1 => quantity,
        -1 => -quantity,
        _ => Decimal::ZERO,
    }
}

/// Replay a batch's ledger: creation quantity plus the signed sum of all
/// event effects. Used to verify the cached projection.
pub fn replay_quantity(initial_units: Decimal, events: &[(EventType, Option<Decimal>)]) -> Decimal {
    events
        .iter()
        .fold(initial_units, |acc, (event_type, quantity)| {
            acc + signed_effect(*event_type, *quantity)
        })
}
