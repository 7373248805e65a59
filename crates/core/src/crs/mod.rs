//! Coordinate Reference System handling

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// EPSG codes of the geographic (lon/lat) systems we are likely to meet.
const GEOGRAPHIC_EPSG: [u32; 4] = [4326, 4674, 4258, 4269];

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            proj: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: Some(proj.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Whether coordinates in this CRS are angular (lon/lat degrees).
    ///
    /// Planar distances are meaningless in such systems.
    pub fn is_geographic(&self) -> bool {
        if let Some(code) = self.epsg {
            return GEOGRAPHIC_EPSG.contains(&code);
        }
        if let Some(proj) = &self.proj {
            return proj.contains("+proj=longlat") || proj.contains("+proj=latlong");
        }
        if let Some(wkt) = &self.wkt {
            let head = wkt.trim_start();
            return head.starts_with("GEOGCS") || head.starts_with("GEOGCRS");
        }
        false
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // Textual comparison is imperfect but never yields a false positive
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        if let (Some(a), Some(b)) = (&self.proj, &other.proj) {
            return normalize_proj(a) == normalize_proj(b);
        }

        false
    }

    /// Authority-code style identifier, e.g. `EPSG:31983`
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", wkt.chars().take(50).collect::<String>());
        }
        "Unknown".to_string()
    }
}

/// Sort the `+key=value` tokens so token order does not affect equality.
fn normalize_proj(proj: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = proj.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

impl FromStr for CRS {
    type Err = Error;

    /// Parse `EPSG:<code>`, a bare `+proj=` string, or WKT.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidParameter {
                name: "crs",
                value: String::new(),
                reason: "empty CRS definition".into(),
            });
        }

        if let Some(code) = s
            .strip_prefix("EPSG:")
            .or_else(|| s.strip_prefix("epsg:"))
        {
            let code: u32 = code.trim().parse().map_err(|_| Error::InvalidParameter {
                name: "crs",
                value: s.to_string(),
                reason: "EPSG code must be an unsigned integer".into(),
            })?;
            return Ok(Self::from_epsg(code));
        }

        if s.starts_with('+') {
            return Ok(Self::from_proj(s));
        }

        Ok(Self::from_wkt(s))
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
