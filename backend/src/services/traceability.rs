//! Traceability ledger service
//!
//! The ledger is append-only. The single write path is `append`, invoked
//! inside the transaction that performs the causing batch mutation, so the
//! cached projection (`batches.current_units`) and the audit trail commit or
//! roll back together. No update or delete path exists anywhere.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::TenantScope;
use shared::{Batch, DateRange, EventType, TraceabilityEvent, UnitOfMeasure};

/// Ledger query service; writes go through [`TraceabilityService::append`]
#[derive(Clone)]
pub struct TraceabilityService {
    db: PgPool,
}

/// Input for appending a ledger event, built by the mutating services
#[derive(Debug)]
pub struct NewEvent {
    pub tenant_id: Uuid,
    pub facility_id: Uuid,
    pub batch_id: Uuid,
    pub new_batch_id: Option<Uuid>,
    pub event_type: EventType,
    pub quantity: Option<Decimal>,
    pub unit: Option<UnitOfMeasure>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub from_sub_location: Option<String>,
    pub to_sub_location: Option<String>,
    pub description: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub user_id: Uuid,
}

impl NewEvent {
    /// Base event for a batch: identity fields prefilled, everything else
    /// empty. Callers set the type-specific fields with struct update
    /// syntax.
    pub fn for_batch(batch: &Batch, event_type: EventType, user_id: Uuid) -> Self {
        Self {
            tenant_id: batch.tenant_id,
            facility_id: batch.facility_id,
            batch_id: batch.id,
            new_batch_id: None,
            event_type,
            quantity: None,
            unit: None,
            from_location: None,
            to_location: None,
            from_sub_location: None,
            to_sub_location: None,
            description: None,
            reference_type: None,
            reference_id: None,
            user_id,
        }
    }
}

/// Database row for a ledger event
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    tenant_id: Uuid,
    facility_id: Uuid,
    batch_id: Uuid,
    new_batch_id: Option<Uuid>,
    event_type: String,
    quantity: Option<Decimal>,
    unit: Option<String>,
    from_location: Option<String>,
    to_location: Option<String>,
    from_sub_location: Option<String>,
    to_sub_location: Option<String>,
    description: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<String>,
    user_id: Uuid,
    occurred_at: DateTime<Utc>,
}

impl EventRow {
    pub(crate) fn into_event(self) -> AppResult<TraceabilityEvent> {
        let event_type = EventType::from_str(&self.event_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown ledger event type: {}", self.event_type))
        })?;
        let unit = match self.unit {
            Some(ref u) => Some(
                UnitOfMeasure::from_str(u)
                    .ok_or_else(|| AppError::Internal(format!("Unknown unit of measure: {}", u)))?,
            ),
            None => None,
        };

        Ok(TraceabilityEvent {
            id: self.id,
            tenant_id: self.tenant_id,
            facility_id: self.facility_id,
            batch_id: self.batch_id,
            new_batch_id: self.new_batch_id,
            event_type,
            quantity: self.quantity,
            unit,
            from_location: self.from_location,
            to_location: self.to_location,
            from_sub_location: self.from_sub_location,
            to_sub_location: self.to_sub_location,
            description: self.description,
            reference_type: self.reference_type,
            reference_id: self.reference_id,
            user_id: self.user_id,
            occurred_at: self.occurred_at,
        })
    }
}

const EVENT_COLUMNS: &str = "id, tenant_id, facility_id, batch_id, new_batch_id, event_type, \
                             quantity, unit, from_location, to_location, from_sub_location, \
                             to_sub_location, description, reference_type, reference_id, \
                             user_id, occurred_at";

impl TraceabilityService {
    /// Create a new TraceabilityService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append an event inside the caller's transaction. Rows in
    /// `traceability_events` are write-once; the database trigger rejects
    /// UPDATE and DELETE outright.
    pub async fn append(
        tx: &mut Transaction<'_, Postgres>,
        event: NewEvent,
    ) -> AppResult<TraceabilityEvent> {
        let query = format!(
            r#"
            INSERT INTO traceability_events (
                tenant_id, facility_id, batch_id, new_batch_id, event_type, quantity, unit,
                from_location, to_location, from_sub_location, to_sub_location,
                description, reference_type, reference_id, user_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {EVENT_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, EventRow>(&query)
            .bind(event.tenant_id)
            .bind(event.facility_id)
            .bind(event.batch_id)
            .bind(event.new_batch_id)
            .bind(event.event_type.as_str())
            .bind(event.quantity)
            .bind(event.unit.map(|u| u.as_str()))
            .bind(&event.from_location)
            .bind(&event.to_location)
            .bind(&event.from_sub_location)
            .bind(&event.to_sub_location)
            .bind(&event.description)
            .bind(&event.reference_type)
            .bind(&event.reference_id)
            .bind(event.user_id)
            .fetch_one(&mut **tx)
            .await?;

        row.into_event()
    }

    /// All events owned by a batch, oldest first (replay order)
    pub async fn events_for_batch(
        &self,
        scope: TenantScope,
        batch_id: Uuid,
    ) -> AppResult<Vec<TraceabilityEvent>> {
        let batch_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM batches WHERE id = $1 AND (tenant_id = $2 OR $3))",
        )
        .bind(batch_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .fetch_one(&self.db)
        .await?;

        if !batch_exists {
            return Err(AppError::NotFound("Batch".to_string()));
        }

        let query = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM traceability_events
            WHERE batch_id = $1
            ORDER BY occurred_at ASC, seq ASC
            "#
        );

        let rows = sqlx::query_as::<_, EventRow>(&query)
            .bind(batch_id)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// Events for a facility within an inclusive date range, oldest first.
    /// Feeds the report generator and facility-wide reconciliation.
    pub async fn events_for_facility_in_range(
        &self,
        scope: TenantScope,
        facility_id: Uuid,
        range: DateRange,
    ) -> AppResult<Vec<TraceabilityEvent>> {
        let query = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM traceability_events
            WHERE facility_id = $1
              AND (tenant_id = $2 OR $3)
              AND occurred_at::date BETWEEN $4 AND $5
            ORDER BY occurred_at ASC, seq ASC
            "#
        );

        let rows = sqlx::query_as::<_, EventRow>(&query)
            .bind(facility_id)
            .bind(scope.tenant_id)
            .bind(scope.privileged)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }
}
