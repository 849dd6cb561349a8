//! Spatial Helpers
//!
//! Turns WKT query output into features, prepares polygon layers for
//! publishing and derives layer-level facts (type, extent, spatial reference).

use geo::{BoundingRect, Geometry, MultiPolygon, Polygon};
use serde::Serialize;
use serde_json::{Map, Value};
use wkt::TryFromWkt;

use crate::domain::models::dataset::{CellValue, Dataset};
use crate::shared::errors::{DataPortalError, Result};

/// Column the spatial query writes `Shape.STAsText()` into
pub const WKT_COLUMN: &str = "Shape_wkt";

/// One geometry with its attribute values
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

/// Axis-aligned extent of a set of features
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

/// Spatial reference in the shape the portal expects (`{"wkid": 2285}`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpatialReference {
    pub wkid: i32,
}

impl From<i32> for SpatialReference {
    fn from(wkid: i32) -> Self {
        Self { wkid }
    }
}

/// Build features from a dataset whose `wkt_column` holds WKT text.
///
/// The WKT column is consumed; every other column becomes a property.
///
/// # Errors
///
/// Returns `DataPortalError::SpatialData` when the column is missing or a
/// row holds no parsable geometry.
pub fn create_features_from_wkt(dataset: &Dataset, wkt_column: &str) -> Result<Vec<Feature>> {
    let Some(geometry_index) = dataset.column_index(wkt_column) else {
        return Err(DataPortalError::spatial_data(format!(
            "WKT column '{wkt_column}' not found in Dataset"
        )));
    };

    let mut features = Vec::with_capacity(dataset.row_count());
    for (row_number, row) in dataset.rows().iter().enumerate() {
        let geometry = match &row[geometry_index] {
            CellValue::Text(text) => Geometry::<f64>::try_from_wkt_str(text).map_err(|e| {
                DataPortalError::spatial_data("Failed to create features from WKT")
                    .with_details(format!("Row {row_number}: {e}"))
            })?,
            other => {
                return Err(
                    DataPortalError::spatial_data("Failed to create features from WKT")
                        .with_details(format!("Row {row_number}: expected WKT text, found '{other}'")),
                )
            }
        };

        let properties = dataset
            .columns()
            .iter()
            .zip(row)
            .enumerate()
            .filter(|(index, _)| *index != geometry_index)
            .map(|(_, (name, value))| (name.clone(), value.to_json()))
            .collect();

        features.push(Feature {
            geometry,
            properties,
        });
    }

    tracing::debug!(count = features.len(), "Created features from WKT");
    Ok(features)
}

/// Drop the interior rings of a polygon
#[must_use]
pub fn close_polygon_holes(polygon: &Polygon<f64>) -> Polygon<f64> {
    if polygon.interiors().is_empty() {
        return polygon.clone();
    }
    Polygon::new(polygon.exterior().clone(), Vec::new())
}

fn is_polygonal(geometry: &Geometry<f64>) -> bool {
    matches!(geometry, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
}

/// Prepare a polygon layer for publishing.
///
/// When every geometry is a polygon or multipolygon, multipolygons are split
/// into one feature per part (properties copied) and, if `close_holes` is
/// set, interior rings are removed. Other layers are returned unchanged.
#[must_use]
pub fn simplify_features(features: Vec<Feature>, close_holes: bool) -> Vec<Feature> {
    if features.is_empty() {
        tracing::warn!("No features provided for simplification");
        return features;
    }
    if !features.iter().all(|f| is_polygonal(&f.geometry)) {
        return features;
    }

    let fix = |polygon: Polygon<f64>| {
        if close_holes {
            close_polygon_holes(&polygon)
        } else {
            polygon
        }
    };

    let mut simplified = Vec::with_capacity(features.len());
    for feature in features {
        match feature.geometry {
            Geometry::MultiPolygon(MultiPolygon(parts)) => {
                for part in parts {
                    simplified.push(Feature {
                        geometry: Geometry::Polygon(fix(part)),
                        properties: feature.properties.clone(),
                    });
                }
            }
            Geometry::Polygon(polygon) => simplified.push(Feature {
                geometry: Geometry::Polygon(fix(polygon)),
                properties: feature.properties,
            }),
            other => simplified.push(Feature {
                geometry: other,
                properties: feature.properties,
            }),
        }
    }

    tracing::debug!(count = simplified.len(), close_holes, "Simplified polygon features");
    simplified
}

fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) | Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Type of the first feature's geometry. Mixed layers are logged.
#[must_use]
pub fn geometry_type(features: &[Feature]) -> Option<&'static str> {
    let mut types: Vec<&'static str> = Vec::new();
    for feature in features {
        let name = geometry_type_name(&feature.geometry);
        if !types.contains(&name) {
            types.push(name);
        }
    }
    let primary = *types.first()?;
    if types.len() > 1 {
        tracing::warn!(types = ?types, primary, "Mixed geometry types found");
    }
    Some(primary)
}

/// Total bounds of all features, `None` when there is nothing to measure
#[must_use]
pub fn calculate_bounds(features: &[Feature]) -> Option<Bounds> {
    features
        .iter()
        .filter_map(|f| f.geometry.bounding_rect())
        .fold(None, |acc: Option<Bounds>, rect| {
            let (min, max) = (rect.min(), rect.max());
            Some(match acc {
                None => Bounds {
                    minx: min.x,
                    miny: min.y,
                    maxx: max.x,
                    maxy: max.y,
                },
                Some(b) => Bounds {
                    minx: b.minx.min(min.x),
                    miny: b.miny.min(min.y),
                    maxx: b.maxx.max(max.x),
                    maxy: b.maxy.max(max.y),
                },
            })
        })
}

/// Accept an SRID as an integer or a `{"wkid": n}` map.
///
/// # Errors
///
/// Returns `DataPortalError::SpatialData` for any other shape.
pub fn validate_spatial_reference(value: &Value) -> Result<SpatialReference> {
    let as_wkid = |v: &Value| v.as_i64().and_then(|n| i32::try_from(n).ok());
    match value {
        Value::Number(_) => as_wkid(value)
            .map(SpatialReference::from)
            .ok_or_else(|| DataPortalError::spatial_data("SRID must be an integer")),
        Value::Object(map) if map.contains_key("wkid") => map
            .get("wkid")
            .and_then(as_wkid)
            .map(SpatialReference::from)
            .ok_or_else(|| DataPortalError::spatial_data("SRID 'wkid' value must be an integer")),
        _ => Err(DataPortalError::spatial_data(
            "SRID must be an integer or dictionary with 'wkid' key",
        )),
    }
}

/// Serialize features as a GeoJSON `FeatureCollection`
#[must_use]
pub fn to_feature_collection(features: &[Feature]) -> geojson::FeatureCollection {
    let features = features
        .iter()
        .map(|feature| geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&feature.geometry))),
            id: None,
            properties: Some(feature.properties.clone()),
            foreign_members: None,
        })
        .collect();
    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
