use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// FIPS county code, the join key between geometry and education data.
pub type Fips = i64;

/// A county boundary decoded from the topology.
#[derive(Debug, Clone)]
pub struct County {
    pub id: Fips,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EducationRecord {
    pub fips: Fips,
    pub state: String,
    pub area_name: String,
    #[serde(rename = "bachelorsOrHigher")]
    pub bachelors_or_higher: f64,
}

/// A county extended with the fields of its education record, if any.
#[derive(Debug, Clone)]
pub struct CombinedCounty {
    pub id: Fips,
    pub geometry: MultiPolygon<f64>,
    pub state: Option<String>,
    pub area_name: Option<String>,
    pub education: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendBucket {
    pub threshold: f64,
    pub color: String,
}
