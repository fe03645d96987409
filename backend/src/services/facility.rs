//! Facility and cultivation area lookups
//!
//! These records are owned by the surrounding CRUD layer; the compliance
//! core only reads them. Capacity checks, report headers, and justification
//! reasons all resolve through here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::TenantScope;
use shared::{CultivationArea, DiscrepancyReason, Facility, UnitOfMeasure};

/// Read-side service for facility, area, and discrepancy-reason records
#[derive(Clone)]
pub struct FacilityService {
    db: PgPool,
}

impl FacilityService {
    /// Create a new FacilityService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get a facility by ID
    pub async fn get_facility(&self, scope: TenantScope, facility_id: Uuid) -> AppResult<Facility> {
        let row = sqlx::query_as::<
            _,
            (
                Uuid,
                Option<Uuid>,
                String,
                String,
                String,
                String,
                String,
                String,
                String,
                DateTime<Utc>,
            ),
        >(
            r#"
            SELECT id, tenant_id, licence_number, site_code, name, address, city, province,
                   postal_code, created_at
            FROM facilities
            WHERE id = $1 AND (tenant_id = $2 OR $3)
            "#,
        )
        .bind(facility_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Facility".to_string()))?;

        Ok(Facility {
            id: row.0,
            tenant_id: row.1,
            licence_number: row.2,
            site_code: row.3,
            name: row.4,
            address: row.5,
            city: row.6,
            province: row.7,
            postal_code: row.8,
            created_at: row.9,
        })
    }

    /// Get a cultivation area by ID
    pub async fn get_cultivation_area(
        &self,
        scope: TenantScope,
        area_id: Uuid,
    ) -> AppResult<CultivationArea> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, Uuid, String, Decimal, String, DateTime<Utc>)>(
            r#"
            SELECT id, tenant_id, facility_id, name, capacity_units, unit, created_at
            FROM cultivation_areas
            WHERE id = $1 AND (tenant_id = $2 OR $3)
            "#,
        )
        .bind(area_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Cultivation area".to_string()))?;

        let unit = UnitOfMeasure::from_str(&row.5)
            .ok_or_else(|| AppError::Internal(format!("Unknown unit of measure: {}", row.5)))?;

        Ok(CultivationArea {
            id: row.0,
            tenant_id: row.1,
            facility_id: row.2,
            name: row.3,
            capacity_units: row.4,
            unit,
            created_at: row.6,
        })
    }

    /// Sum of current units held by live batches in a cultivation area.
    /// Archived and terminal batches no longer occupy capacity.
    pub async fn area_in_use_units(&self, area_id: Uuid) -> AppResult<Decimal> {
        let in_use = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(current_units), 0)
            FROM batches
            WHERE cultivation_area_id = $1
              AND status NOT IN ('destroyed', 'sold')
              AND is_archived = FALSE
            "#,
        )
        .bind(area_id)
        .fetch_one(&self.db)
        .await?;

        Ok(in_use)
    }

    /// Get a discrepancy reason by ID
    pub async fn get_discrepancy_reason(
        &self,
        scope: TenantScope,
        reason_id: Uuid,
    ) -> AppResult<DiscrepancyReason> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String)>(
            "SELECT id, tenant_id, name FROM discrepancy_reasons WHERE id = $1 AND (tenant_id = $2 OR $3)",
        )
        .bind(reason_id)
        .bind(scope.tenant_id)
        .bind(scope.privileged)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Discrepancy reason".to_string()))?;

        Ok(DiscrepancyReason {
            id: row.0,
            tenant_id: row.1,
            name: row.2,
        })
    }
}
