//! Principal Identifiers
//!
//! A principal owns a stream of traces and one storage subtree. Internally it is a
//! UUID; on disk and inside opaque keys it is rendered in the 32 hex digit
//! "simple" form (no dashes). The nil UUID is never a valid principal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// A validated, non-nil principal id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    /// Wrap a UUID, rejecting the nil value.
    pub fn new(id: Uuid) -> Result<Self> {
        if id.is_nil() {
            return Err(CoreError::InvalidPrincipal(id.simple().to_string()));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random principal id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Directory name used for this principal's storage subtree.
    pub fn dir_name(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for PrincipalId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let id = Uuid::parse_str(s.trim()).map_err(|_| CoreError::InvalidPrincipal(s.to_string()))?;
        Self::new(id)
    }
}

impl TryFrom<Uuid> for PrincipalId {
    type Error = CoreError;

    fn try_from(id: Uuid) -> Result<Self> {
        Self::new(id)
    }
}

impl Serialize for PrincipalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PrincipalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
