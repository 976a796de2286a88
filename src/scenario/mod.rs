use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tilegeo::LatLon;

const EARTH_RADIUS_NM: f64 = 3440.065;

/// A named point along a scenario route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub position: LatLon,
}

/// The kinds of scenario the generator knows how to lay out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Left-hand traffic pattern around a runway
    Circuit {
        runway_start: LatLon,
        runway_end: LatLon,
        upwind_nm: f64,
        width_nm: f64,
        final_nm: f64,
    },
    PhotoTour { stops: Vec<Waypoint> },
    WikiList { items: Vec<Waypoint> },
    /// Single destination point; the navigation itself is out of scope here
    Celestial { destination: LatLon },
}

impl ScenarioKind {
    /// Route coordinates in flying order
    pub fn coordinates(&self) -> Vec<LatLon> {
        match self {
            ScenarioKind::Circuit {
                runway_start,
                runway_end,
                upwind_nm,
                width_nm,
                final_nm,
            } => circuit_coordinates(*runway_start, *runway_end, *upwind_nm, *width_nm, *final_nm),
            ScenarioKind::PhotoTour { stops } => stops.iter().map(|w| w.position).collect(),
            ScenarioKind::WikiList { items } => items.iter().map(|w| w.position).collect(),
            ScenarioKind::Celestial { destination } => vec![*destination],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScenarioKind::Circuit { .. } => "circuit",
            ScenarioKind::PhotoTour { .. } => "photo tour",
            ScenarioKind::WikiList { .. } => "wiki list",
            ScenarioKind::Celestial { .. } => "celestial",
        }
    }
}

/// A scenario plan as read from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPlan {
    pub name: String,
    pub scenario: ScenarioKind,
    /// Centre of the location thumbnail; defaults to the first route point
    #[serde(default)]
    pub location: Option<LatLon>,
}

impl ScenarioPlan {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn coordinates(&self) -> Vec<LatLon> {
        self.scenario.coordinates()
    }

    pub fn location(&self) -> Option<LatLon> {
        self.location.or_else(|| self.coordinates().first().copied())
    }
}

/// Start, takeoff end, upwind turn, crosswind turn, base turn, final fix, start
fn circuit_coordinates(
    start: LatLon,
    end: LatLon,
    upwind_nm: f64,
    width_nm: f64,
    final_nm: f64,
) -> Vec<LatLon> {
    let heading = bearing(start, end);
    let left = heading - 90.0;

    let upwind = destination(end, heading, upwind_nm);
    let crosswind = destination(upwind, left, width_nm);
    let final_fix = destination(start, heading + 180.0, final_nm);
    let base = destination(final_fix, left, width_nm);

    vec![start, end, upwind, crosswind, base, final_fix, start]
}

/// Initial great-circle bearing from `from` to `to` in degrees, 0..360
pub fn bearing(from: LatLon, to: LatLon) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Point reached by travelling `distance_nm` from `from` on `bearing_deg`
pub fn destination(from: LatLon, bearing_deg: f64, distance_nm: f64) -> LatLon {
    let angular = distance_nm / EARTH_RADIUS_NM;
    let bearing = bearing_deg.to_radians();
    let lat1 = from.lat.to_radians();
    let lon1 = from.lon.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let east = bearing.sin() * angular.sin() * lat1.cos();
    let north = angular.cos() - lat1.sin() * lat2.sin();
    let lon2 = lon1 + east.atan2(north);

    // Normalise to -180..180
    let lon = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    LatLon::new(lat2.to_degrees(), lon)
}
