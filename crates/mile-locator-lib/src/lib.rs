//! Mile Locator Library - Linear Referencing Against Highway Networks
//!
//! Given a point near a road network, this library answers where the point sits as a
//! highway chainage ("mile marker"), which carriageway direction it belongs to, and how it
//! relates to the reference features around it (administrative boundaries, roadside
//! facilities, other roads).
//!
//! # Architecture
//!
//! - **[`chainage`]**: `007K+250` mile strings to kilometres and back
//! - **[`filter`]**: radius-bounded working windows over feature sets
//! - **[`nearest`]**: nearest-road projection with per-road deduplication
//! - **[`segment`]**: splitting road polylines into chainage-bounded segments
//! - **[`direction`]**: translate-and-test heading resolution
//! - **[`proximity`]**: Voronoi "area capture" near/middle classification
//! - **[`topology`]**: batch topological predicates over named collections
//! - **[`tangent`]**: outer bitangents between convex polygons and azimuth ranges
//! - **[`Locator`]**: the end-to-end "locate this point" pipeline
//!
//! All metric work is done in a per-request local planar frame measured in kilometres
//! (see [`utils::LocalFrame`]); reports are mapped back to longitude/latitude.

pub mod azimuth;
pub mod chainage;
mod collection;
mod config;
pub mod direction;
pub mod filter;
mod locator;
pub mod nearest;
pub mod proximity;
mod report;
pub mod segment;
pub mod tangent;
pub mod topology;
pub mod utils;

// Public API exports
pub use collection::{
    Feature, MileMarker, NamedCollection, ReferenceData, RoadPolyline, gpx_points,
    read_gpx_points,
};
pub use config::{Columns, Config, ROAD_COLLECTION, RelationPlan};
pub use direction::{DirectionSearch, Heading};
pub use locator::{Locator, Placement, Query};
pub use nearest::RouteFilter;
pub use report::{
    AlongRoad, DirectionReport, LocationReport, ProximityReport, RelationReport, ReportData,
    ReportStatus, TOO_FAR_MESSAGE,
};
pub use topology::Relation;

/// Error types for the locator
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("The input point is too far from the road ({distance_km:.3} km > {threshold_km} km)")]
    OutOfRange { distance_km: f64, threshold_km: f64 },

    #[error("Malformed chainage string: {input:?}")]
    Format { input: String },

    #[error("Geometry precondition violated: {0}")]
    GeometryPrecondition(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GPX parsing error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LocateError>;
