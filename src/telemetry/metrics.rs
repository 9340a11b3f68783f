//! Metric instrument factories for maintq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"maintq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for maintq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("maintq")
}

/// Counter: requests created through intake.
/// Labels: `type` ("Corrective" | "Preventive").
pub fn requests_created() -> Counter<u64> {
    meter()
        .u64_counter("maintq.requests.created")
        .with_description("Number of maintenance requests created")
        .build()
}

/// Counter: request status transitions.
/// Labels: `from`, `to`.
pub fn request_transitions() -> Counter<u64> {
    meter()
        .u64_counter("maintq.requests.transitions")
        .with_description("Number of request status transitions")
        .build()
}

/// Counter: equipment marked scrapped by the lifecycle engine.
pub fn equipment_scrapped() -> Counter<u64> {
    meter()
        .u64_counter("maintq.equipment.scrapped")
        .with_description("Number of equipment rows marked scrapped")
        .build()
}

/// Counter: change-feed events applied by mirrors.
/// Labels: `collection`, `event` ("insert" | "update" | "delete").
pub fn mirror_events() -> Counter<u64> {
    meter()
        .u64_counter("maintq.mirror.events")
        .with_description("Change-feed events applied to local mirrors")
        .build()
}

/// Histogram: duration of one analytics refresh pass.
pub fn analytics_refresh_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("maintq.analytics.refresh_ms")
        .with_description("Analytics refresh duration in milliseconds")
        .with_unit("ms")
        .build()
}
