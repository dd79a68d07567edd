use std::fmt;
use std::str::FromStr;

use anchor_reloc_core::CaptureType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of floor-marker fiducial names.
pub const FLOOR_MARKER_PREFIX: &str = "floor_marker_";

/// Which image of a package a fiducial is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiducialKind {
    Reference(CaptureType),
    FloorMarker,
}

impl FiducialKind {
    #[inline]
    pub fn is_floor_marker(self) -> bool {
        matches!(self, FiducialKind::FloorMarker)
    }

    /// Capture type this kind corresponds to; floor markers count as close-range floor shots.
    pub fn capture_type(self) -> CaptureType {
        match self {
            FiducialKind::Reference(t) => t,
            FiducialKind::FloorMarker => CaptureType::FloorClose,
        }
    }
}

/// Decoded fiducial name.
///
/// Grammar:
///
/// ```text
/// name   := "floor_marker_" uuid | uuid "-" suffix
/// uuid   := 5 dash-separated hex groups
/// suffix := capture type (floor_far, wall_north, ...)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FiducialName {
    pub package_id: Uuid,
    pub kind: FiducialKind,
}

impl FiducialName {
    pub fn reference(package_id: Uuid, capture_type: CaptureType) -> Self {
        Self {
            package_id,
            kind: FiducialKind::Reference(capture_type),
        }
    }

    pub fn floor_marker(package_id: Uuid) -> Self {
        Self {
            package_id,
            kind: FiducialKind::FloorMarker,
        }
    }
}

impl fmt::Display for FiducialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FiducialKind::FloorMarker => write!(f, "{FLOOR_MARKER_PREFIX}{}", self.package_id),
            FiducialKind::Reference(t) => write!(f, "{}-{}", self.package_id, t),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFiducialNameError {
    #[error("fiducial name `{0}` does not contain a package id")]
    Malformed(String),
    #[error("fiducial name `{name}` has an invalid package id")]
    InvalidPackageId { name: String },
    #[error("fiducial name `{name}` has unknown type suffix `{suffix}`")]
    UnknownSuffix { name: String, suffix: String },
}

impl FromStr for FiducialName {
    type Err = ParseFiducialNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(FLOOR_MARKER_PREFIX) {
            let package_id = Uuid::parse_str(rest).map_err(|_| ParseFiducialNameError::InvalidPackageId {
                name: s.to_owned(),
            })?;
            return Ok(Self::floor_marker(package_id));
        }

        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() < 6 {
            return Err(ParseFiducialNameError::Malformed(s.to_owned()));
        }
        let package_id = Uuid::parse_str(&parts[..5].join("-")).map_err(|_| {
            ParseFiducialNameError::InvalidPackageId { name: s.to_owned() }
        })?;
        let suffix = parts[5..].join("-");
        let capture_type = suffix
            .parse::<CaptureType>()
            .map_err(|_| ParseFiducialNameError::UnknownSuffix {
                name: s.to_owned(),
                suffix,
            })?;
        Ok(Self::reference(package_id, capture_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reference_and_floor_marker() {
        let id = Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").expect("uuid");
        assert_eq!(
            FiducialName::reference(id, CaptureType::WallNorth).to_string(),
            "6f9619ff-8b86-d011-b42d-00c04fc964ff-wall_north"
        );
        assert_eq!(
            FiducialName::floor_marker(id).to_string(),
            "floor_marker_6f9619ff-8b86-d011-b42d-00c04fc964ff"
        );
    }

    #[test]
    fn decodes_every_kind() {
        let id = Uuid::new_v4();
        for t in CaptureType::ALL {
            let name = FiducialName::reference(id, t);
            assert_eq!(name.to_string().parse::<FiducialName>(), Ok(name));
        }
        let fm = FiducialName::floor_marker(id);
        assert_eq!(fm.to_string().parse::<FiducialName>(), Ok(fm));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            "wall_north".parse::<FiducialName>(),
            Err(ParseFiducialNameError::Malformed(_))
        ));
        assert!(matches!(
            "floor_marker_not-a-uuid".parse::<FiducialName>(),
            Err(ParseFiducialNameError::InvalidPackageId { .. })
        ));
        assert!(matches!(
            "zzzzzzzz-8b86-d011-b42d-00c04fc964ff-wall_north".parse::<FiducialName>(),
            Err(ParseFiducialNameError::InvalidPackageId { .. })
        ));
        let err = "6f9619ff-8b86-d011-b42d-00c04fc964ff-ceiling"
            .parse::<FiducialName>()
            .expect_err("unknown suffix");
        assert_eq!(
            err,
            ParseFiducialNameError::UnknownSuffix {
                name: "6f9619ff-8b86-d011-b42d-00c04fc964ff-ceiling".into(),
                suffix: "ceiling".into(),
            }
        );
    }
}
