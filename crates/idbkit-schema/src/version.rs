//! Schema version numbers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use crate::error::SchemaError;
use crate::Result;

/// A positive database version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SchemaVersion(NonZeroU32);

impl SchemaVersion {
    pub const INITIAL: SchemaVersion = SchemaVersion(NonZeroU32::MIN);

    pub fn new(version: u32) -> Result<Self> {
        NonZeroU32::new(version).map(SchemaVersion).ok_or_else(|| {
            SchemaError::InvalidArgument(format!(
                "version ({}) should be a positive number",
                version
            ))
        })
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for SchemaVersion {
    type Error = SchemaError;

    fn try_from(version: u32) -> Result<Self> {
        Self::new(version)
    }
}

impl From<SchemaVersion> for u32 {
    fn from(version: SchemaVersion) -> Self {
        version.get()
    }
}

impl std::str::FromStr for SchemaVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<f64>()
            .map_err(|_| {
                SchemaError::InvalidArgument(format!("version ({}) should be a number", s))
            })
            .and_then(|v| v.into_schema_version())
    }
}

/// Values accepted as a version when registering an upgrade
pub trait IntoSchemaVersion {
    fn into_schema_version(self) -> Result<SchemaVersion>;
}

impl IntoSchemaVersion for SchemaVersion {
    fn into_schema_version(self) -> Result<SchemaVersion> {
        Ok(self)
    }
}

impl IntoSchemaVersion for u32 {
    fn into_schema_version(self) -> Result<SchemaVersion> {
        SchemaVersion::new(self)
    }
}

impl IntoSchemaVersion for u64 {
    fn into_schema_version(self) -> Result<SchemaVersion> {
        u32::try_from(self)
            .map_err(|_| SchemaError::InvalidArgument(format!("version ({}) is out of range", self)))?
            .into_schema_version()
    }
}

impl IntoSchemaVersion for i32 {
    fn into_schema_version(self) -> Result<SchemaVersion> {
        i64::from(self).into_schema_version()
    }
}

impl IntoSchemaVersion for i64 {
    fn into_schema_version(self) -> Result<SchemaVersion> {
        if self <= 0 {
            return Err(SchemaError::InvalidArgument(format!(
                "version ({}) should be a positive number",
                self
            )));
        }
        (self as u64).into_schema_version()
    }
}

impl IntoSchemaVersion for f64 {
    fn into_schema_version(self) -> Result<SchemaVersion> {
        if !self.is_finite() || self.fract() != 0.0 {
            return Err(SchemaError::InvalidArgument(format!(
                "version ({}) should be a whole number",
                self
            )));
        }
        if self <= 0.0 || self > f64::from(u32::MAX) {
            return Err(SchemaError::InvalidArgument(format!(
                "version ({}) is out of range",
                self
            )));
        }
        (self as u32).into_schema_version()
    }
}

impl IntoSchemaVersion for &str {
    fn into_schema_version(self) -> Result<SchemaVersion> {
        self.parse()
    }
}

impl IntoSchemaVersion for String {
    fn into_schema_version(self) -> Result<SchemaVersion> {
        self.as_str().parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_positive_numbers() {
        assert_eq!(3u32.into_schema_version().unwrap().get(), 3);
        assert_eq!(4i64.into_schema_version().unwrap().get(), 4);
        assert_eq!(2.0f64.into_schema_version().unwrap().get(), 2);
        assert_eq!(" 7 ".into_schema_version().unwrap().get(), 7);
    }

    #[test]
    fn test_rejects_non_positive_and_non_numeric() {
        assert!(0u32.into_schema_version().is_err());
        assert!((-1i32).into_schema_version().is_err());
        assert!(1.5f64.into_schema_version().is_err());
        assert!(f64::NAN.into_schema_version().is_err());
        assert!("abc".into_schema_version().is_err());
        assert!("".into_schema_version().is_err());
        assert!(u64::MAX.into_schema_version().is_err());
    }

    #[test]
    fn test_ordering_and_default() {
        let v1 = SchemaVersion::default();
        let v2 = SchemaVersion::new(2).unwrap();
        assert!(v1 < v2);
        assert_eq!(v1.get(), 1);
        assert_eq!(v2.to_string(), "2");
    }
}
