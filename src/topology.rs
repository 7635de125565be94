//! TopoJSON decoding.
//!
//! A topology stores shared boundary segments ("arcs") once and describes each
//! polygon ring as a list of references into that arc table. Quantized
//! topologies additionally delta-encode arc positions on an integer grid and
//! carry a `transform` to map them back.

use crate::types::{County, Fips};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use rayon::prelude::*;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("topology has no object named '{0}'")]
    MissingObject(String),
    #[error("arc reference {reference} out of range ({count} arcs)")]
    ArcOutOfRange { reference: i64, count: usize },
    #[error("geometry id {0} is not a FIPS code")]
    InvalidId(String),
}

#[derive(Debug, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub transform: Option<Transform>,
    pub arcs: Vec<Vec<Vec<f64>>>,
    pub objects: HashMap<String, Geometry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Transform {
    pub scale: [f64; 2],
    pub translate: [f64; 2],
}

#[derive(Debug)]
pub enum Geometry {
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
    Polygon {
        arcs: Vec<Vec<i64>>,
        id: Option<Value>,
    },
    MultiPolygon {
        arcs: Vec<Vec<Vec<i64>>>,
        id: Option<Value>,
    },
    /// Points, lines, null geometries and anything else a county map has no
    /// use for.
    Other,
}

/// Wire form of a geometry whose `type` is a string.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum TaggedGeometry {
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
    Polygon {
        arcs: Vec<Vec<i64>>,
        #[serde(default)]
        id: Option<Value>,
    },
    MultiPolygon {
        arcs: Vec<Vec<Vec<i64>>>,
        #[serde(default)]
        id: Option<Value>,
    },
    #[serde(other)]
    Other,
}

impl From<TaggedGeometry> for Geometry {
    fn from(tagged: TaggedGeometry) -> Self {
        match tagged {
            TaggedGeometry::GeometryCollection { geometries } => Geometry::GeometryCollection { geometries },
            TaggedGeometry::Polygon { arcs, id } => Geometry::Polygon { arcs, id },
            TaggedGeometry::MultiPolygon { arcs, id } => Geometry::MultiPolygon { arcs, id },
            TaggedGeometry::Other => Geometry::Other,
        }
    }
}

impl<'de> Deserialize<'de> for Geometry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        // A null (or absent) type marks an empty geometry.
        if !matches!(value.get("type"), Some(Value::String(_))) {
            return Ok(Geometry::Other);
        }
        TaggedGeometry::deserialize(value)
            .map(Geometry::from)
            .map_err(serde::de::Error::custom)
    }
}

type Arcs = Vec<Vec<Coord<f64>>>;

impl Topology {
    /// Decodes the named object into one [`County`] per polygonal geometry.
    pub fn counties(&self, object: &str) -> Result<Vec<County>, TopologyError> {
        let root = self
            .objects
            .get(object)
            .ok_or_else(|| TopologyError::MissingObject(object.to_string()))?;

        let arcs = self.absolute_arcs();

        let mut leaves = Vec::new();
        collect_polygonal(root, &mut leaves);

        let decoded: Vec<Option<County>> = leaves
            .par_iter()
            .map(|geometry| decode_county(geometry, &arcs))
            .collect::<Result<_, _>>()?;

        let skipped = decoded.iter().filter(|c| c.is_none()).count();
        if skipped > 0 {
            tracing::warn!(skipped, "geometries without an id were skipped");
        }

        Ok(decoded.into_iter().flatten().collect())
    }

    /// Resolves every arc to absolute coordinates, undoing quantization.
    fn absolute_arcs(&self) -> Arcs {
        self.arcs
            .par_iter()
            .map(|arc| {
                let positions = arc.iter().filter(|p| p.len() >= 2);
                match self.transform {
                    Some(t) => {
                        let (mut x, mut y) = (0.0, 0.0);
                        positions
                            .map(|p| {
                                x += p[0];
                                y += p[1];
                                Coord {
                                    x: x * t.scale[0] + t.translate[0],
                                    y: y * t.scale[1] + t.translate[1],
                                }
                            })
                            .collect()
                    }
                    None => positions.map(|p| Coord { x: p[0], y: p[1] }).collect(),
                }
            })
            .collect()
    }
}

fn collect_polygonal<'a>(geometry: &'a Geometry, out: &mut Vec<&'a Geometry>) {
    match geometry {
        Geometry::GeometryCollection { geometries } => {
            for g in geometries {
                collect_polygonal(g, out);
            }
        }
        Geometry::Polygon { .. } | Geometry::MultiPolygon { .. } => out.push(geometry),
        Geometry::Other => {}
    }
}

fn decode_county(geometry: &Geometry, arcs: &Arcs) -> Result<Option<County>, TopologyError> {
    let (id, polygons) = match geometry {
        Geometry::Polygon { arcs: rings, id } => (id, vec![polygon(rings, arcs)?]),
        Geometry::MultiPolygon { arcs: parts, id } => (
            id,
            parts
                .iter()
                .map(|rings| polygon(rings, arcs))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => return Ok(None),
    };

    let id = match id {
        Some(value) => parse_fips(value)?,
        None => return Ok(None),
    };

    let polygons = polygons.into_iter().flatten().collect();
    Ok(Some(County { id, geometry: MultiPolygon::new(polygons) }))
}

fn parse_fips(value: &Value) -> Result<Fips, TopologyError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| TopologyError::InvalidId(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| TopologyError::InvalidId(s.clone())),
        other => Err(TopologyError::InvalidId(other.to_string())),
    }
}

/// First ring is the exterior, the rest are holes. `None` for an empty polygon.
fn polygon(rings: &[Vec<i64>], arcs: &Arcs) -> Result<Option<Polygon<f64>>, TopologyError> {
    let mut rings = rings
        .iter()
        .map(|refs| ring(refs, arcs))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|r| !r.0.is_empty());

    Ok(rings.next().map(|exterior| Polygon::new(exterior, rings.collect())))
}

fn ring(refs: &[i64], arcs: &Arcs) -> Result<LineString<f64>, TopologyError> {
    let mut points: Vec<Coord<f64>> = Vec::new();

    for &reference in refs {
        // Negative references point at arc !i, walked backwards.
        let (index, reversed) = if reference < 0 {
            (!reference as usize, true)
        } else {
            (reference as usize, false)
        };
        let arc = arcs.get(index).ok_or(TopologyError::ArcOutOfRange {
            reference,
            count: arcs.len(),
        })?;

        // Consecutive arcs share an endpoint.
        points.pop();
        if reversed {
            points.extend(arc.iter().rev());
        } else {
            points.extend(arc.iter());
        }
    }

    if !points.is_empty() && points.len() < 4 {
        points.push(points[0]);
    }

    Ok(LineString::new(points))
}
