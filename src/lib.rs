//! # a2b Library
//!
//! Geocodes, routes and orders locations kept in Excel workbooks, using a
//! Nominatim geocoder and an OSRM router.
//!
//! ## Features
//!
//! - **Fill missing**: complete coordinates, distances and durations of an
//!   origin/destination table without touching cells that are already filled
//! - **Ordering**: build the full route matrix of a location list and visit it
//!   greedily, nearest location (by driving time) first
//! - **Memoization**: each description is geocoded and each ordered pair routed
//!   at most once per run
//! - **Progress tracking**: optional progress callbacks for custom UIs
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Fill the empty cells of the "A->B" sheet, in place
//!     a2b::fill_workbook("trips.xlsx", "trips.xlsx", a2b::PAIR_SHEET,
//!         a2b::ServiceConfig::default(), a2b::EngineOptions::default()).await?;
//!
//!     // Order the "A ordonner" sheet into a "Résultats" sheet
//!     let route = a2b::order_workbook("stops.xlsx", "stops.xlsx", a2b::LOCATION_SHEET,
//!         a2b::RESULTS_SHEET, None, a2b::ServiceConfig::default(),
//!         a2b::EngineOptions::default()).await?;
//!     println!("{} legs, {:.2} km", route.legs.len(), route.total_distance_km());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Working without spreadsheets
//!
//! ```rust,no_run
//! use a2b::{EngineOptions, ReconciliationDriver, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut driver = ReconciliationDriver::new(ServiceConfig::default(), EngineOptions::default())?;
//!     let stops = vec!["Rennes".to_string(), "Brest".to_string(), "Nantes".to_string()];
//!     let route = driver.order_then_route(&stops, Some("Nantes")).await?;
//!     for leg in &route.legs {
//!         println!("{leg}");
//!     }
//!     Ok(())
//! }
//! ```

use std::path::Path;

use log::info;

// Re-export core types that users might need
pub use crate::core::config::{ServiceConfig, DEFAULT_GEOCODER_URL, DEFAULT_ROUTER_URL};
pub use crate::core::duration::{format_duration, parse_duration};
pub use crate::core::error::{
    suggest_correction, Error, GeocodingFailure, Result, RoutingFailure, TransportError,
};
pub use crate::core::geocoder::CoordinateResolver;
pub use crate::core::model::{Location, RouteEdge, RouteMatrix};
pub use crate::core::options::{EngineOptions, FailurePolicy, ProgressCallback};
pub use crate::core::reconcile::{
    Endpoint, FillReport, OrderedRoute, PairRow, ReconciliationDriver, RowFailure, RunStats,
};
pub use crate::core::router::RouteMatrixBuilder;
pub use crate::core::sequencer::{route_legs, sequence};
pub use crate::core::sheet::{
    Cell, SheetData, WorkbookData, LOCATION_SHEET, PAIR_SHEET, RESULTS_SHEET,
};

// Internal modules
mod core;

/// Fill the missing cells of a pair sheet and write the workbook to `output`
///
/// Every other sheet of `input` is carried over to `output`. Under
/// `FailurePolicy::Abort` nothing is written when a row fails.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use a2b::{EngineOptions, FailurePolicy, ServiceConfig};
///
/// let options = EngineOptions {
///     failure_policy: FailurePolicy::Continue,
///     ..Default::default()
/// };
/// let report = a2b::fill_workbook("in.xlsx", "out.xlsx", "A->B", ServiceConfig::default(), options).await?;
/// for failure in &report.failures {
///     eprintln!("{}: {}", failure.label, failure.error);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn fill_workbook(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    sheet: &str,
    config: ServiceConfig,
    options: EngineOptions,
) -> Result<FillReport> {
    let mut workbook = WorkbookData::open(input.as_ref())?;
    let rows = workbook.pair_rows(sheet)?;
    info!("Read {} rows from sheet '{sheet}'", rows.len());

    let mut driver = ReconciliationDriver::new(config, options)?;
    let report = driver.fill_missing(&rows).await?;

    workbook.set_pair_rows(sheet, &report.rows);
    workbook.save(output.as_ref())?;
    info!("Wrote {}", output.as_ref().display());

    Ok(report)
}

/// Order the locations of `sheet` and write the legs to `results_sheet`
///
/// `start` names the first location; the first row is used when it is `None`.
/// The location sheet itself is left as it was.
pub async fn order_workbook(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    sheet: &str,
    results_sheet: &str,
    start: Option<&str>,
    config: ServiceConfig,
    options: EngineOptions,
) -> Result<OrderedRoute> {
    let mut workbook = WorkbookData::open(input.as_ref())?;
    let descriptions = workbook.location_descriptions(sheet)?;
    info!("Read {} locations from sheet '{sheet}'", descriptions.len());

    let mut driver = ReconciliationDriver::new(config, options)?;
    let route = driver.order_then_route(&descriptions, start).await?;

    workbook.set_ordered_route(results_sheet, &route);
    workbook.save(output.as_ref())?;
    info!("Wrote {}", output.as_ref().display());

    Ok(route)
}
