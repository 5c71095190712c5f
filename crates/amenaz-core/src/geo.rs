//! GeoJSON parsing and validation.
//!
//! Layer payloads arrive as untyped JSON from the backend or the local cache.
//! Everything is funnelled through [`GeoData`], which accepts a
//! FeatureCollection, a single Feature or a bare geometry and normalizes it
//! to a list of features. Anything that does not match the GeoJSON shape is
//! rejected with a [`GeoError`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Expected {expected} for {field}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Unknown GeoJSON type: {0}")]
    UnknownType(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

/// A single longitude/latitude pair. Altitude, if present, is dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::GeometryCollection(_) => "GeometryCollection",
        }
    }

    /// Whether this geometry is drawn as markers rather than paths
    pub fn is_point_like(&self) -> bool {
        matches!(self, Geometry::Point(_) | Geometry::MultiPoint(_))
    }

    fn from_value(value: &Value) -> Result<Self, GeoError> {
        let kind = type_of(value)?;
        if kind == "GeometryCollection" {
            let geometries = value
                .get("geometries")
                .ok_or(GeoError::MissingField("geometries"))?
                .as_array()
                .ok_or(GeoError::UnexpectedType {
                    field: "geometries",
                    expected: "array",
                })?;
            return geometries
                .iter()
                .map(Geometry::from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Geometry::GeometryCollection);
        }

        let coords = value
            .get("coordinates")
            .ok_or(GeoError::MissingField("coordinates"))?;
        match kind {
            "Point" => Ok(Geometry::Point(parse_position(coords)?)),
            "MultiPoint" => Ok(Geometry::MultiPoint(parse_positions(coords)?)),
            "LineString" => Ok(Geometry::LineString(parse_positions(coords)?)),
            "MultiLineString" => Ok(Geometry::MultiLineString(parse_nested(coords, parse_positions)?)),
            "Polygon" => Ok(Geometry::Polygon(parse_nested(coords, parse_positions)?)),
            "MultiPolygon" => Ok(Geometry::MultiPolygon(parse_nested(coords, |v| {
                parse_nested(v, parse_positions)
            })?)),
            other => Err(GeoError::UnknownType(other.to_string())),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Geometry::GeometryCollection(items) => json!({
                "type": "GeometryCollection",
                "geometries": items.iter().map(Geometry::to_value).collect::<Vec<_>>(),
            }),
            _ => json!({
                "type": self.type_name(),
                "coordinates": self.coordinates_value(),
            }),
        }
    }

    fn coordinates_value(&self) -> Value {
        fn pos(p: &Position) -> Value {
            json!([p.lon, p.lat])
        }
        fn line(ps: &[Position]) -> Value {
            Value::Array(ps.iter().map(pos).collect())
        }
        fn rings(rs: &[Vec<Position>]) -> Value {
            Value::Array(rs.iter().map(|r| line(r)).collect())
        }
        match self {
            Geometry::Point(p) => pos(p),
            Geometry::MultiPoint(ps) | Geometry::LineString(ps) => line(ps),
            Geometry::MultiLineString(rs) | Geometry::Polygon(rs) => rings(rs),
            Geometry::MultiPolygon(polys) => Value::Array(polys.iter().map(|p| rings(p)).collect()),
            Geometry::GeometryCollection(_) => Value::Null,
        }
    }
}

impl Serialize for Geometry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

impl Feature {
    fn from_value(value: &Value) -> Result<Self, GeoError> {
        let geometry = match value.get("geometry") {
            None | Some(Value::Null) => None,
            Some(g) => Some(Geometry::from_value(g)?),
        };
        let properties = match value.get("properties") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(GeoError::UnexpectedType {
                    field: "properties",
                    expected: "object",
                })
            }
        };
        Ok(Self { geometry, properties })
    }

    fn to_value(&self) -> Value {
        json!({
            "type": "Feature",
            "geometry": self.geometry.as_ref().map(Geometry::to_value),
            "properties": Value::Object(self.properties.clone()),
        })
    }
}

/// Validated geographic data for one layer.
///
/// Serializes as a FeatureCollection regardless of the input shape, so cached
/// copies always round-trip through the same validation path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct GeoData {
    pub features: Vec<Feature>,
}

impl GeoData {
    pub fn from_value(value: &Value) -> Result<Self, GeoError> {
        match type_of(value)? {
            "FeatureCollection" => {
                let features = value
                    .get("features")
                    .ok_or(GeoError::MissingField("features"))?
                    .as_array()
                    .ok_or(GeoError::UnexpectedType {
                        field: "features",
                        expected: "array",
                    })?
                    .iter()
                    .map(Feature::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self { features })
            }
            "Feature" => Ok(Self {
                features: vec![Feature::from_value(value)?],
            }),
            _ => Ok(Self {
                features: vec![Feature {
                    geometry: Some(Geometry::from_value(value)?),
                    properties: Map::new(),
                }],
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }
}

impl TryFrom<Value> for GeoData {
    type Error = GeoError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        GeoData::from_value(&value)
    }
}

impl From<GeoData> for Value {
    fn from(data: GeoData) -> Self {
        json!({
            "type": "FeatureCollection",
            "features": data.features.iter().map(Feature::to_value).collect::<Vec<_>>(),
        })
    }
}

fn type_of(value: &Value) -> Result<&str, GeoError> {
    value
        .get("type")
        .ok_or(GeoError::MissingField("type"))?
        .as_str()
        .ok_or(GeoError::UnexpectedType {
            field: "type",
            expected: "string",
        })
}

fn parse_position(value: &Value) -> Result<Position, GeoError> {
    let arr = value
        .as_array()
        .ok_or_else(|| GeoError::InvalidCoordinates(format!("not a position: {}", value)))?;
    match (arr.first().and_then(Value::as_f64), arr.get(1).and_then(Value::as_f64)) {
        (Some(lon), Some(lat)) => Ok(Position { lon, lat }),
        _ => Err(GeoError::InvalidCoordinates(format!("not a position: {}", value))),
    }
}

fn parse_positions(value: &Value) -> Result<Vec<Position>, GeoError> {
    parse_nested(value, parse_position)
}

fn parse_nested<T>(
    value: &Value,
    item: impl Fn(&Value) -> Result<T, GeoError>,
) -> Result<Vec<T>, GeoError> {
    value
        .as_array()
        .ok_or_else(|| GeoError::InvalidCoordinates(format!("expected array, got {}", value)))?
        .iter()
        .map(item)
        .collect()
}
