//! Coordinate reference systems.
//!
//! A [`Crs`] is either an EPSG code with a built-in PROJ definition, or a
//! raw PROJ string for anything else.

use crate::error::{DedupError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Coordinate reference system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// EPSG authority code.
    Epsg(u32),
    /// PROJ definition string, e.g. `+proj=longlat +datum=WGS84`.
    Proj(String),
}

/// WGS 84 longitude/latitude, the frame H3 boundaries are expressed in.
pub const WGS84: Crs = Crs::Epsg(4326);

/// OSGB36 / British National Grid.
pub const BRITISH_NATIONAL_GRID: Crs = Crs::Epsg(27700);

const BUILTIN: &[(u32, &str)] = &[
    (4326, "+proj=longlat +datum=WGS84 +no_defs"),
    (4258, "+proj=longlat +ellps=GRS80 +no_defs"),
    (
        3857,
        "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs",
    ),
    (
        27700,
        "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 +ellps=airy \
         +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489 +units=m +no_defs",
    ),
];

impl Crs {
    /// EPSG code, if this CRS was given as one.
    #[must_use]
    pub fn epsg_code(&self) -> Option<u32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Proj(_) => None,
        }
    }

    /// PROJ definition for this CRS.
    pub fn proj_string(&self) -> Result<Cow<'_, str>> {
        match self {
            Crs::Epsg(code) => BUILTIN
                .iter()
                .find(|(c, _)| c == code)
                .map(|(_, def)| Cow::Borrowed(*def))
                .ok_or_else(|| {
                    DedupError::InvalidCrs(format!(
                        "no built-in definition for EPSG:{code}; pass a PROJ string instead"
                    ))
                }),
            Crs::Proj(def) => Ok(Cow::Borrowed(def.as_str())),
        }
    }
}

impl FromStr for Crs {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with('+') {
            return Ok(Crs::Proj(s.to_string()));
        }
        let code = s
            .split_once(':')
            .filter(|(authority, _)| authority.eq_ignore_ascii_case("EPSG"))
            .map(|(_, code)| code)
            .ok_or_else(|| DedupError::InvalidCrs(format!("expected EPSG:<code> or +proj=..., got {s:?}")))?;
        code.parse()
            .map(Crs::Epsg)
            .map_err(|_| DedupError::InvalidCrs(format!("invalid EPSG code {code:?}")))
    }
}

impl TryFrom<String> for Crs {
    type Error = DedupError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Proj(def) => f.write_str(def),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_epsg() {
        assert_eq!("EPSG:27700".parse::<Crs>().unwrap(), BRITISH_NATIONAL_GRID);
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), WGS84);
        assert!("EPSG:abc".parse::<Crs>().is_err());
        assert!("ESRI:102100".parse::<Crs>().is_err());
    }

    #[test]
    fn test_parse_proj_string() {
        let crs: Crs = "+proj=longlat +ellps=GRS80".parse().unwrap();
        assert_eq!(crs.epsg_code(), None);
        assert_eq!(crs.proj_string().unwrap(), "+proj=longlat +ellps=GRS80");
    }

    #[test]
    fn test_unknown_epsg_has_no_definition() {
        assert!(matches!(
            Crs::Epsg(2154).proj_string(),
            Err(DedupError::InvalidCrs(_))
        ));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&BRITISH_NATIONAL_GRID).unwrap();
        assert_eq!(json, "\"EPSG:27700\"");
        let back: Crs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BRITISH_NATIONAL_GRID);
    }
}
