use clap::{Args, Parser, Subcommand};
use mile_locator_lib::{Config, NamedCollection, ReferenceData, Result};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Mile Locator - locate points on highway networks as chainage, heading and spatial relations
pub struct Settings {
    /// JSON configuration file (missing keys keep their defaults)
    #[clap(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Override: radius of the working window in km
    #[clap(long, global = true)]
    pub window_radius_km: Option<f64>,

    /// Override: maximum distance from the point to the nearest road in km
    #[clap(long, global = true)]
    pub network_threshold_km: Option<f64>,

    /// Override: tolerance for a chainage marker lying on a road in km
    #[clap(long, global = true)]
    pub on_road_tolerance_km: Option<f64>,

    /// Override: first translation of the direction search in km
    #[clap(long, global = true)]
    pub direction_initial_km: Option<f64>,

    /// Override: increment between direction search attempts in km
    #[clap(long, global = true)]
    pub direction_step_km: Option<f64>,

    /// Override: largest translation of the direction search in km
    #[clap(long, global = true)]
    pub direction_max_km: Option<f64>,

    /// Override: normalized share a facility must exceed to be reported as near
    #[clap(long, global = true)]
    pub proximity_share_threshold: Option<f64>,

    /// Override: buffer used for boundary straddling in km
    #[clap(long, global = true)]
    pub boundary_threshold_km: Option<f64>,

    /// Pretty-print the JSON output
    #[clap(long, default_value = "false", global = true)]
    pub pretty: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Locate a single point
    Locate {
        /// Longitude in degrees
        #[clap(long, allow_negative_numbers = true)]
        lon: f64,

        /// Latitude in degrees
        #[clap(long, allow_negative_numbers = true)]
        lat: f64,

        /// Only project onto roads with this road number (`unknown` for any)
        #[clap(long)]
        route: Option<String>,

        #[clap(flatten)]
        reference: ReferenceArgs,
    },

    /// Locate every waypoint (or track point) of a GPX file
    Batch {
        /// GPX file with the points to locate
        #[clap(long, value_name = "FILE")]
        gpx: PathBuf,

        #[clap(flatten)]
        reference: ReferenceArgs,
    },

    /// Evaluate a topological relation between a geometry and the reference collections
    Relate {
        /// GeoJSON file whose first feature is the query geometry
        #[clap(long, value_name = "FILE")]
        geometry: PathBuf,

        /// One of equals, disjoint, touches, contains, covers, intersects, within,
        /// crosses, overlaps
        #[clap(long, default_value = "intersects")]
        relation: String,

        #[clap(flatten)]
        reference: ReferenceArgs,
    },

    /// Outer tangents and azimuth range between two convex polygons
    Tangent {
        /// GeoJSON file with the first polygon
        #[clap(long, value_name = "FILE")]
        first: PathBuf,

        /// GeoJSON file with the second polygon
        #[clap(long, value_name = "FILE")]
        second: PathBuf,
    },

    /// Bearing and fuzzy direction from a reference geometry to a target geometry
    Azimuth {
        /// GeoJSON file with the target geometry
        #[clap(long, value_name = "FILE")]
        target: PathBuf,

        /// GeoJSON file with the reference geometry
        #[clap(long, value_name = "FILE")]
        reference: PathBuf,
    },
}

/// Reference collections, all GeoJSON FeatureCollections
#[derive(Args, Debug, Clone)]
pub struct ReferenceArgs {
    /// Road network (LineStrings with `id` and `roadnum`)
    #[clap(long, value_name = "FILE")]
    pub roads: Option<PathBuf>,

    /// Chainage markers (Points with `name` and `index`)
    #[clap(long, value_name = "FILE")]
    pub markers: Option<PathBuf>,

    /// Facility collection, repeatable
    #[clap(long = "facility", value_name = "NAME=LABEL=FILE")]
    pub facilities: Vec<CollectionSource>,

    /// Boundary collection, repeatable
    #[clap(long = "boundary", value_name = "NAME=LABEL=FILE")]
    pub boundaries: Vec<CollectionSource>,

    /// Column tying facilities to a road number (default: the configured column)
    #[clap(long)]
    pub facility_road_column: Option<String>,
}

/// A named collection on disk: `NAME=LABEL_COLUMN=FILE`
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSource {
    pub name: String,
    pub label_column: String,
    pub path: PathBuf,
}

impl FromStr for CollectionSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(label), Some(path)) if !name.is_empty() && !path.is_empty() => {
                Ok(Self {
                    name: name.to_string(),
                    label_column: label.to_string(),
                    path: PathBuf::from(path),
                })
            }
            _ => Err(format!("expected NAME=LABEL_COLUMN=FILE, got '{s}'")),
        }
    }
}

impl CollectionSource {
    fn load(&self) -> Result<NamedCollection> {
        NamedCollection::from_path(&self.name, &self.label_column, &self.path)
    }
}

impl ReferenceArgs {
    /// Read every collection given on the command line
    pub fn load(&self) -> Result<ReferenceData> {
        let features = |path: &Option<PathBuf>| -> Result<_> {
            match path {
                Some(path) => Ok(NamedCollection::from_path("", "", path)?.features),
                None => Ok(Vec::new()),
            }
        };
        let mut data = ReferenceData::new(features(&self.roads)?, features(&self.markers)?);
        for source in &self.facilities {
            let mut facilities = source.load()?;
            if let Some(column) = &self.facility_road_column {
                facilities = facilities.with_road_number_column(column);
            }
            data = data.with_facilities(facilities);
        }
        for source in &self.boundaries {
            data = data.with_boundaries(source.load()?);
        }
        tracing::info!(
            "Loaded {} roads, {} markers, {} facility and {} boundary collections",
            data.roads.len(),
            data.markers.len(),
            data.facilities.len(),
            data.boundaries.len()
        );
        Ok(data)
    }
}

impl Settings {
    /// Locator configuration: file (or defaults) with command-line overrides applied
    pub fn locator_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_path(path)?,
            None => Config::default(),
        };
        if let Some(value) = self.window_radius_km {
            config.window_radius_km = value;
        }
        if let Some(value) = self.network_threshold_km {
            config.network_threshold_km = value;
        }
        if let Some(value) = self.on_road_tolerance_km {
            config.on_road_tolerance_km = value;
        }
        if let Some(value) = self.direction_initial_km {
            config.direction.initial_km = value;
        }
        if let Some(value) = self.direction_step_km {
            config.direction.step_km = value;
        }
        if let Some(value) = self.direction_max_km {
            config.direction.max_km = value;
        }
        if let Some(value) = self.proximity_share_threshold {
            config.proximity_share_threshold = value;
        }
        if let Some(value) = self.boundary_threshold_km {
            config.boundary_threshold_km = value;
        }
        config.validate()?;
        Ok(config)
    }
}
