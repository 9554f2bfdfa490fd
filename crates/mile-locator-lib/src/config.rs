//! Locator configuration
//!
//! Every tuning constant of the pipeline lives here so it can be calibrated against real
//! network geometry without touching code. The whole struct round-trips through JSON.

use crate::direction::DirectionSearch;
use crate::topology::Relation;
use crate::{LocateError, Result};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name under which the segmented road network is evaluated in relation plans
pub const ROAD_COLLECTION: &str = "Route";

/// Property names read from the reference collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    /// Road identifier (one physical carriageway). Default: `id`
    pub road_id: String,
    /// Road number shared by both carriageways. Default: `roadnum`
    pub road_number: String,
    /// Mile string of a chainage marker. Default: `name`
    pub marker_mile: String,
    /// Road-direction identifier of a chainage marker. Default: `index`
    pub marker_route: String,
    /// Road number of a roadside facility. Default: `roadnum`
    pub facility_road_number: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            road_id: "id".to_string(),
            road_number: "roadnum".to_string(),
            marker_mile: "name".to_string(),
            marker_route: "index".to_string(),
            facility_road_number: "roadnum".to_string(),
        }
    }
}

/// Which predicate runs against which named collection in a location report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationPlan(pub BTreeMap<Relation, Vec<String>>);

impl RelationPlan {
    /// Collections the given relation should be evaluated against
    pub fn collections(&self, relation: Relation) -> &[String] {
        self.0.get(&relation).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over (relation, collection names) in relation order
    pub fn iter(&self) -> impl Iterator<Item = (Relation, &[String])> {
        self.0.iter().map(|(r, names)| (*r, names.as_slice()))
    }
}

impl Default for RelationPlan {
    fn default() -> Self {
        let mut plan = BTreeMap::new();
        plan.insert(
            Relation::Intersects,
            vec![
                ROAD_COLLECTION.to_string(),
                "RouteAncillaryFacilities".to_string(),
                "County".to_string(),
            ],
        );
        plan.insert(Relation::Within, vec!["County".to_string()]);
        Self(plan)
    }
}

/// Configuration for the locator pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Radius of the working window every reference collection is cut down to.
    /// Default: 4.0 km
    pub window_radius_km: f64,
    /// Maximum distance from the query point to the nearest road (inclusive).
    /// Default: 0.2 km
    pub network_threshold_km: f64,
    /// Tolerance for "this projected marker lies on this road" during segmentation.
    /// Default: 0.002 km (two 1 m buffers)
    pub on_road_tolerance_km: f64,
    /// Translate-and-test parameters of the direction search
    pub direction: DirectionSearch,
    /// Normalized near-degree share a facility must exceed to be reported.
    /// Default: 0.4
    pub proximity_share_threshold: f64,
    /// Buffer around the query point used for boundary straddling. Default: 1.0 km
    pub boundary_threshold_km: f64,
    /// Property names of the reference collections
    pub columns: Columns,
    /// Topological relations evaluated for the report
    pub relations: RelationPlan,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_radius_km: 4.0,
            network_threshold_km: 0.2,
            on_road_tolerance_km: 0.002,
            direction: DirectionSearch::default(),
            proximity_share_threshold: 0.4,
            boundary_threshold_km: 1.0,
            columns: Columns::default(),
            relations: RelationPlan::default(),
        }
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Config {
    /// Read a configuration from a JSON file; missing keys keep their defaults
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("window_radius_km", self.window_radius_km),
            ("network_threshold_km", self.network_threshold_km),
            ("on_road_tolerance_km", self.on_road_tolerance_km),
            ("direction.step_km", self.direction.step_km),
            ("boundary_threshold_km", self.boundary_threshold_km),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(LocateError::InputValidation(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.proximity_share_threshold) {
            return Err(LocateError::InputValidation(format!(
                "proximity_share_threshold must be within [0, 1], got {}",
                self.proximity_share_threshold
            )));
        }
        if self.direction.max_km < self.direction.initial_km {
            return Err(LocateError::InputValidation(
                "direction.max_km must not be smaller than direction.initial_km".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.window_radius_km, 4.0);
        assert_eq!(config.network_threshold_km, 0.2);
        assert_eq!(config.on_road_tolerance_km, 0.002);
        assert_eq!(config.proximity_share_threshold, 0.4);
        assert_eq!(config.boundary_threshold_km, 1.0);
        assert_eq!(config.columns.road_id, "id");
        assert_eq!(config.columns.marker_mile, "name");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_relation_plan() {
        let plan = RelationPlan::default();
        assert_eq!(plan.collections(Relation::Intersects).len(), 3);
        assert_eq!(plan.collections(Relation::Within), ["County".to_string()]);
        assert!(plan.collections(Relation::Crosses).is_empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"network_threshold_km": 0.5, "columns": {"road_id": "gid"}}"#,
        )
        .unwrap();
        assert_eq!(config.network_threshold_km, 0.5);
        assert_eq!(config.columns.road_id, "gid");
        assert_eq!(config.columns.road_number, "roadnum");
        assert_eq!(config.window_radius_km, 4.0);
    }

    #[test]
    fn test_relation_plan_json_uses_lowercase_names() {
        let json = serde_json::to_value(RelationPlan::default()).unwrap();
        assert!(json.get("intersects").is_some());
        assert!(json.get("within").is_some());

        let parsed: RelationPlan =
            serde_json::from_str(r#"{"crosses": ["Route"], "touches": []}"#).unwrap();
        assert_eq!(parsed.collections(Relation::Crosses), ["Route".to_string()]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.network_threshold_km = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.proximity_share_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.direction.max_km = 0.0;
        assert!(config.validate().is_err());
    }
}
