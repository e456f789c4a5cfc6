//! Tracking lookups, dashboard listing and CSV export
//!
//! Read-only: nothing here writes to the store.

use anyhow::Context;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{self, ShipmentRepository};
use crate::models::{is_stale, ShipmentDetail, ShipmentFilter, ShipmentSummary};
use crate::services::shipments::ShipmentError;
use crate::utils::validation::is_plausible_lookup_id;

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;

pub const CSV_HEADER: [&str; 13] = [
    "trackingId",
    "origin",
    "destination",
    "sender",
    "receiver",
    "cargo",
    "weight",
    "driver",
    "vehicle",
    "count",
    "shipmentType",
    "createdAt",
    "updatedAt",
];

/// One exported line, in `CSV_HEADER` order; missing values are empty cells
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    tracking_id: &'a str,
    origin: Option<&'a str>,
    destination: Option<&'a str>,
    sender: Option<&'a str>,
    receiver: Option<&'a str>,
    cargo: Option<&'a str>,
    weight: Option<&'a str>,
    driver: Option<&'a str>,
    vehicle: Option<&'a str>,
    count: i64,
    shipment_type: Option<&'a str>,
    created_at: String,
    updated_at: String,
}

/// Clamp a requested page size into `1..=MAX_LIST_LIMIT`
pub fn effective_limit(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT)
}

#[derive(Clone)]
pub struct TrackingFinder {
    pool: SqlitePool,
}

impl TrackingFinder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Case-insensitive lookup returning the public detail view
    pub async fn find_by_id(&self, tracking_id: &str) -> Result<ShipmentDetail, ShipmentError> {
        let tracking_id = tracking_id.trim();
        let not_found = || ShipmentError::NotFound(format!("shipment {} not found", tracking_id));

        if !is_plausible_lookup_id(tracking_id) {
            return Err(not_found());
        }

        let shipment = ShipmentRepository::new(&self.pool)
            .get(tracking_id)
            .await?
            .ok_or_else(not_found)?;

        Ok(ShipmentDetail::from_shipment(shipment, db::now()))
    }

    /// Dashboard rows, most recently updated first
    pub async fn list(
        &self,
        filter: &ShipmentFilter,
        limit: Option<u32>,
    ) -> Result<Vec<ShipmentSummary>, ShipmentError> {
        let now = db::now();
        let listed = ShipmentRepository::new(&self.pool)
            .search(filter, Some(effective_limit(limit)))
            .await?;

        Ok(listed
            .into_iter()
            .map(|item| ShipmentSummary {
                stale: is_stale(item.last_status_at, now),
                tracking_id: item.shipment.tracking_id,
                origin: item.shipment.origin,
                destination: item.shipment.destination,
                driver: item.shipment.driver,
                vehicle: item.shipment.vehicle,
                updated_at: item.shipment.updated_at,
                last_status: item.last_status,
                last_status_at: item.last_status_at,
            })
            .collect())
    }

    /// Every shipment matching the filter as CSV bytes, header included
    pub async fn export_csv(&self, filter: &ShipmentFilter) -> Result<Vec<u8>, ShipmentError> {
        let listed = ShipmentRepository::new(&self.pool)
            .search(filter, None)
            .await?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .write_record(CSV_HEADER)
            .context("Failed to write CSV header")?;

        for item in &listed {
            let s = &item.shipment;
            writer
                .serialize(CsvRow {
                    tracking_id: &s.tracking_id,
                    origin: s.origin.as_deref(),
                    destination: s.destination.as_deref(),
                    sender: s.sender.as_deref(),
                    receiver: s.receiver.as_deref(),
                    cargo: s.cargo.as_deref(),
                    weight: s.weight.as_deref(),
                    driver: s.driver.as_deref(),
                    vehicle: s.vehicle.as_deref(),
                    count: s.count,
                    shipment_type: s.shipment_type.as_deref(),
                    created_at: db::format_timestamp(s.created_at),
                    updated_at: db::format_timestamp(s.updated_at),
                })
                .with_context(|| format!("Failed to write CSV row for {}", s.tracking_id))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV export: {}", e))?;
        Ok(bytes)
    }
}
