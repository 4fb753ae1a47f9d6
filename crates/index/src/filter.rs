//! Filter Compiler: translates a high-level query predicate into a LanceDB
//! `only_if` filter string. Geographic radius only gets a coarse bounding box
//! here — the exact haversine cut happens as a post-filter in the search engine.

use sleuth_core::{CollectionKind, Direction, Error, Result};

const KM_PER_DEGREE_LAT: f64 = 111.32;

/// A high-level, boundary-facing query predicate. Unknown fields from a
/// caller are simply never read since this struct only names the fields the
/// filter compiler understands — there is nothing to reject for forward
/// compatibility.
#[derive(Debug, Clone, Default)]
pub struct QueryPredicate {
  pub timestamp_start: Option<i64>,
  pub timestamp_end: Option<i64>,
  pub direction: Option<Direction>,
  pub exclude_noise: Option<bool>,
  pub contact: Option<String>,
  pub app: Option<String>,
  /// Used only to route a query to the right collection kind; never compiled
  /// into the filter string itself.
  pub collection_kind: Option<CollectionKind>,
  pub gps_lat: Option<f64>,
  pub gps_lon: Option<f64>,
  pub radius_km: Option<f64>,
}

/// Compile a predicate into a LanceDB `only_if` filter fragment. Returns
/// `Ok(None)` for an empty predicate, which behaves as no predicate at all.
pub fn compile(predicate: &QueryPredicate) -> Result<Option<String>> {
  let mut clauses = Vec::new();

  if let (Some(start), Some(end)) = (predicate.timestamp_start, predicate.timestamp_end)
    && start > end
  {
    return Err(Error::InvalidPredicate(format!("timestamp_start ({start}) > timestamp_end ({end})")));
  }
  // Chunks carry `timestamp_start`/`timestamp_end` instead of a single `timestamp`
  // column; a time-range predicate against a chunks collection must constrain
  // both endpoints rather than a column that doesn't exist there (§4.7, §3.2).
  if predicate.collection_kind == Some(CollectionKind::Chunks) {
    if let Some(start) = predicate.timestamp_start {
      clauses.push(format!("timestamp_start >= {start}"));
    }
    if let Some(end) = predicate.timestamp_end {
      clauses.push(format!("timestamp_end <= {end}"));
    }
  } else {
    if let Some(start) = predicate.timestamp_start {
      clauses.push(format!("timestamp >= {start}"));
    }
    if let Some(end) = predicate.timestamp_end {
      clauses.push(format!("timestamp <= {end}"));
    }
  }

  if let Some(direction) = predicate.direction {
    clauses.push(format!("direction = '{direction}'"));
  }

  if predicate.exclude_noise == Some(true) {
    clauses.push("is_noise = false".to_string());
  }

  if let Some(contact) = &predicate.contact {
    clauses.push(format!("contact = '{}'", escape(contact)));
  }

  if let Some(app) = &predicate.app {
    clauses.push(format!("app = '{}'", escape(app)));
  }

  if let Some(radius_km) = predicate.radius_km {
    let (lat, lon) = match (predicate.gps_lat, predicate.gps_lon) {
      (Some(lat), Some(lon)) => (lat, lon),
      _ => return Err(Error::InvalidPredicate("radius_km given without gps_lat/gps_lon".to_string())),
    };
    if radius_km <= 0.0 {
      return Err(Error::InvalidPredicate(format!("radius_km must be positive, got {radius_km}")));
    }
    clauses.extend(bounding_box_clauses(lat, lon, radius_km));
  }

  if clauses.is_empty() { Ok(None) } else { Ok(Some(clauses.join(" AND "))) }
}

/// Coarse bounding-box clauses around `(lat, lon)` using the small-angle
/// degrees-per-kilometer approximation, evaluated at the query latitude.
fn bounding_box_clauses(lat: f64, lon: f64, radius_km: f64) -> Vec<String> {
  let lat_delta = radius_km / KM_PER_DEGREE_LAT;
  let km_per_degree_lon = KM_PER_DEGREE_LAT * lat.to_radians().cos().abs().max(1e-9);
  let lon_delta = radius_km / km_per_degree_lon;

  vec![
    format!("gps_lat >= {}", lat - lat_delta),
    format!("gps_lat <= {}", lat + lat_delta),
    format!("gps_lon >= {}", lon - lon_delta),
    format!("gps_lon <= {}", lon + lon_delta),
  ]
}

/// Great-circle distance between two lat/lon points, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
  const EARTH_RADIUS_KM: f64 = 6371.0;
  let d_lat = (lat2 - lat1).to_radians();
  let d_lon = (lon2 - lon1).to_radians();
  let a = (d_lat / 2.0).sin().powi(2) + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
  let c = 2.0 * a.sqrt().asin();
  EARTH_RADIUS_KM * c
}

fn escape(value: &str) -> String {
  value.replace('\'', "''")
}
