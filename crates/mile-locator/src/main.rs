//! Mile Locator command line: every subcommand prints one JSON document to stdout

mod logging;
mod settings;

use clap::Parser;
use geo::{Coord, Geometry};
use mile_locator_lib::azimuth::azimuth_relation;
use mile_locator_lib::tangent::{azimuth_range, outer_tangents};
use mile_locator_lib::{
    LocateError, Locator, NamedCollection, Query, Relation, Result, RouteFilter,
};
use serde::Serialize;
use settings::{Command, Settings};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let _guard = logging::setup_logging_and_profiling();
    let settings = Settings::parse();

    match run(&settings) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Run the selected subcommand; `Ok(false)` when the located point came back as an error
fn run(settings: &Settings) -> Result<bool> {
    let config = settings.locator_config()?;

    match &settings.command {
        Command::Locate {
            lon,
            lat,
            route,
            reference,
        } => {
            let data = reference.load()?;
            let mut query = Query::new(*lon, *lat);
            if let Some(route) = route {
                query = query.with_route(RouteFilter::from_label(route));
            }
            let report = Locator::new(config).locate(&query, &data);
            print_json(&report, settings.pretty)?;
            Ok(report.is_success())
        }
        Command::Batch { gpx, reference } => {
            let data = reference.load()?;
            let queries = Query::from_gpx(gpx)?;
            let reports = Locator::new(config).locate_many(&queries, &data);
            let located = reports.iter().filter(|r| r.is_success()).count();
            tracing::info!("Located {located} of {} points", reports.len());
            print_json(&reports, settings.pretty)?;
            Ok(true)
        }
        Command::Relate {
            geometry,
            relation,
            reference,
        } => {
            let query = read_geometry(geometry)?;
            let relation: Relation = relation.parse()?;
            let report = Locator::new(config).relate(&query, relation, &reference.load()?)?;
            print_json(&report, settings.pretty)?;
            Ok(true)
        }
        Command::Tangent { first, second } => {
            let first = polygon_vertices(&read_geometry(first)?)?;
            let second = polygon_vertices(&read_geometry(second)?)?;
            let tangents = outer_tangents(&first, &second)?;
            let azimuth = azimuth_range(&tangents);
            print_json(
                &serde_json::json!({ "tangents": tangents, "azimuth": azimuth }),
                settings.pretty,
            )?;
            Ok(true)
        }
        Command::Azimuth { target, reference } => {
            let relation = azimuth_relation(&read_geometry(target)?, &read_geometry(reference)?)?;
            print_json(&relation, settings.pretty)?;
            Ok(true)
        }
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

/// Geometry of the first feature of a GeoJSON file
fn read_geometry(path: &Path) -> Result<Geometry<f64>> {
    NamedCollection::from_path("", "", path)?
        .features
        .into_iter()
        .next()
        .map(|feature| feature.geometry)
        .ok_or_else(|| {
            LocateError::InputValidation(format!("{} holds no geometry", path.display()))
        })
}

/// Exterior ring of a polygon (first part of a multipolygon)
fn polygon_vertices(geometry: &Geometry<f64>) -> Result<Vec<Coord<f64>>> {
    let polygon = match geometry {
        Geometry::Polygon(polygon) => Some(polygon),
        Geometry::MultiPolygon(polygons) => polygons.0.first(),
        _ => None,
    };
    polygon
        .map(|p| p.exterior().0.clone())
        .ok_or_else(|| LocateError::InputValidation("expected a polygon geometry".to_string()))
}
