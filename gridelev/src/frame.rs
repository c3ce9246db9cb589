//! Reference frame tagging and normalisation.
//!
//! Points and tile extents must both be in geographic degrees before they are
//! matched. Loaders tag every dataset with a [`ReferenceFrame`] read from the
//! GeoJSON `crs` member (RFC 7946 documents carry none and are WGS84), then
//! call [`to_geographic`].
//!
//! With the `proj` feature any EPSG code PROJ knows is transformed to
//! EPSG:4326. Without it only spherical Web Mercator is inverted. A frame
//! that cannot be converted keeps its tag so the resolver can refuse it
//! instead of silently matching in mismatched units.

use std::fmt;

use geo::Coord;
use serde_json::Value;

use crate::error::{ElevationError, Result};

/// Semi-major axis used by spherical Web Mercator.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// EPSG codes that are geographic lon/lat in degrees.
const GEOGRAPHIC_CODES: [u32; 4] = [4326, 4258, 4269, 4979];

/// EPSG codes for spherical Web Mercator (including deprecated aliases).
const WEB_MERCATOR_CODES: [u32; 3] = [3857, 900913, 3785];

/// Coordinate reference frame of a loaded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceFrame {
    /// Longitude/latitude in decimal degrees.
    #[default]
    Geographic,
    /// A projected system identified by its EPSG code.
    Projected { epsg: u32 },
}

impl ReferenceFrame {
    /// Parse a GeoJSON (2008) `crs` member.
    ///
    /// Accepts the named form `{"type": "name", "properties": {"name": ...}}`
    /// as well as a bare string.
    pub fn from_crs_member(value: &Value) -> Result<Self> {
        let name = match value {
            Value::String(s) => s.as_str(),
            Value::Object(obj) => obj
                .get("properties")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .ok_or_else(|| ElevationError::InvalidInput {
                    message: "crs member has no properties.name".to_string(),
                })?,
            Value::Null => return Ok(Self::Geographic),
            other => {
                return Err(ElevationError::InvalidInput {
                    message: format!("unsupported crs member: {}", other),
                })
            }
        };
        Self::from_crs_name(name)
    }

    /// Parse a CRS name such as `EPSG:3857`, `urn:ogc:def:crs:EPSG::4326`
    /// or `urn:ogc:def:crs:OGC:1.3:CRS84`.
    pub fn from_crs_name(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.to_ascii_uppercase().ends_with("CRS84") {
            return Ok(Self::Geographic);
        }

        let code = trimmed
            .rsplit([':', '/'])
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| ElevationError::InvalidInput {
                message: format!("unrecognised CRS name: {}", name),
            })?;

        Ok(Self::from_epsg(code))
    }

    /// Classify an EPSG code.
    pub fn from_epsg(code: u32) -> Self {
        if GEOGRAPHIC_CODES.contains(&code) {
            Self::Geographic
        } else {
            Self::Projected { epsg: code }
        }
    }

    /// Returns `true` for longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Geographic)
    }

    /// Returns `true` for spherical Web Mercator and its aliases.
    pub fn is_web_mercator(&self) -> bool {
        matches!(self, Self::Projected { epsg } if WEB_MERCATOR_CODES.contains(epsg))
    }
}

impl fmt::Display for ReferenceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geographic => write!(f, "geographic (EPSG:4326)"),
            Self::Projected { epsg } => write!(f, "projected (EPSG:{})", epsg),
        }
    }
}

/// Invert spherical Web Mercator metres to longitude/latitude degrees.
pub fn web_mercator_to_geographic(coord: Coord) -> Coord {
    let lon = (coord.x / WEB_MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (coord.y / WEB_MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    Coord { x: lon, y: lat }
}

/// Transformation from a projected frame to geographic degrees.
pub enum ToGeographic {
    /// Closed-form inverse of spherical Web Mercator.
    WebMercator,
    /// PROJ transformation to EPSG:4326 in lon/lat order.
    #[cfg(feature = "proj")]
    Proj(proj::Proj),
}

impl ToGeographic {
    /// Transformation for `frame`, or `None` if it is already geographic
    /// or no transformation is available.
    pub fn for_frame(frame: ReferenceFrame) -> Option<Self> {
        let ReferenceFrame::Projected { epsg } = frame else {
            return None;
        };

        #[cfg(feature = "proj")]
        {
            // new_known_crs normalises the output axes to lon/lat
            match proj::Proj::new_known_crs(&format!("EPSG:{}", epsg), "EPSG:4326", None) {
                Ok(transform) => return Some(Self::Proj(transform)),
                Err(e) => tracing::warn!(epsg, "No transformation to EPSG:4326: {}", e),
            }
        }

        if WEB_MERCATOR_CODES.contains(&epsg) {
            Some(Self::WebMercator)
        } else {
            None
        }
    }

    /// Convert one coordinate.
    pub fn convert(&self, coord: Coord) -> std::result::Result<Coord, String> {
        let converted = match self {
            Self::WebMercator => web_mercator_to_geographic(coord),
            #[cfg(feature = "proj")]
            Self::Proj(transform) => {
                let (x, y) = transform
                    .convert((coord.x, coord.y))
                    .map_err(|e| e.to_string())?;
                Coord { x, y }
            }
        };
        if converted.x.is_finite() && converted.y.is_finite() {
            Ok(converted)
        } else {
            Err(format!("({}, {}) has no geographic position", coord.x, coord.y))
        }
    }
}

/// Convert coordinates in place to geographic degrees where possible.
///
/// Returns the frame the coordinates are in afterwards: `Geographic` on
/// success, or the input frame with the coordinates untouched if no
/// transformation exists or any coordinate fails to convert.
pub fn to_geographic(frame: ReferenceFrame, coords: &mut [Coord]) -> ReferenceFrame {
    let Some(transform) = ToGeographic::for_frame(frame) else {
        return frame;
    };

    let converted = coords
        .iter()
        .map(|&c| transform.convert(c))
        .collect::<std::result::Result<Vec<_>, _>>();
    match converted {
        Ok(converted) => {
            coords.copy_from_slice(&converted);
            ReferenceFrame::Geographic
        }
        Err(message) => {
            tracing::warn!(%frame, "Could not convert coordinates to degrees: {}", message);
            frame
        }
    }
}
