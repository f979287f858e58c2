//! Declarative test case tables.
//!
//! Test cases are authored as a YAML table naming the zones to set up
//! and, per zone, the keys with their role, algorithm, and temporal
//! state. The table is pure data; converting it into the typed key model
//! is where malformed descriptors fail, long before anything touches the
//! network.
//!
//! ```yaml
//! zones:
//!   - name: rsa_ecdsa
//!     keys:
//!       - { ref: ksk-rsa, role: ksk, algorithm: RSASHA256, state: active }
//!       - { ref: zsk-rsa, role: zsk, algorithm: RSASHA256, state: active }
//!       - { ref: csk-ec,  role: csk, algorithm: ECDSAP256SHA256, state: active }
//! ```

use std::fmt;
use std::io;

use serde::Deserialize;

use crate::keyset::{
    InvalidKeyDescriptor, InvalidZoneDescriptor, SigningKey, ZoneKeySet,
};

//------------ Scenario ------------------------------------------------------

/// A declarative table of zones and their key material.
#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    /// The declared zones.
    zones: Vec<ZoneEntry>,
}

impl Scenario {
    /// Reads a scenario from YAML text.
    pub fn from_str(s: &str) -> Result<Self, ScenarioError> {
        serde_yaml::from_str(s).map_err(ScenarioError::Parse)
    }

    /// Reads a scenario from something readable producing YAML.
    pub fn from_reader<R: io::Read>(
        reader: R,
    ) -> Result<Self, ScenarioError> {
        serde_yaml::from_reader(reader).map_err(ScenarioError::Parse)
    }

    /// Converts the table into typed per-zone test cases.
    pub fn into_cases(self) -> Result<Vec<ZoneCase>, ScenarioError> {
        self.zones
            .into_iter()
            .map(|zone| {
                let keys = zone
                    .keys
                    .iter()
                    .map(|key| {
                        Ok(SigningKey::new(
                            key.key_ref.as_str(),
                            key.role.parse()?,
                            key.algorithm.parse()?,
                            key.state.parse()?,
                        )?)
                    })
                    .collect::<Result<Vec<_>, ScenarioError>>()?;
                Ok(ZoneCase {
                    set: ZoneKeySet::new(zone.name, keys)?,
                    records: zone.records,
                })
            })
            .collect()
    }
}

//------------ ZoneEntry -----------------------------------------------------

/// One zone of the table.
#[derive(Clone, Debug, Deserialize)]
struct ZoneEntry {
    /// The name of the zone.
    name: String,

    /// The keys declared for the zone.
    #[serde(default)]
    keys: Vec<KeyEntry>,

    /// The number of filler records to generate into the zone file.
    #[serde(default = "default_records")]
    records: usize,
}

/// One key of a zone.
#[derive(Clone, Debug, Deserialize)]
struct KeyEntry {
    /// Reference to the generated key pair.
    #[serde(rename = "ref")]
    key_ref: String,

    /// The role mnemonic.
    role: String,

    /// The algorithm mnemonic or number.
    algorithm: String,

    /// The temporal state mnemonic.
    state: String,
}

/// The number of filler records used when the table does not say.
fn default_records() -> usize {
    5
}

//------------ ZoneCase ------------------------------------------------------

/// A typed per-zone test case.
#[derive(Clone, Debug)]
pub struct ZoneCase {
    /// The zone's declared keys.
    pub set: ZoneKeySet,

    /// The number of filler records to generate into the zone file.
    pub records: usize,
}

//------------ ScenarioError -------------------------------------------------

/// A scenario table could not be read.
#[derive(Debug)]
pub enum ScenarioError {
    /// The YAML was malformed.
    Parse(serde_yaml::Error),

    /// A key descriptor was malformed.
    Key(InvalidKeyDescriptor),

    /// A zone descriptor was malformed.
    Zone(InvalidZoneDescriptor),
}

impl From<InvalidKeyDescriptor> for ScenarioError {
    fn from(err: InvalidKeyDescriptor) -> Self {
        ScenarioError::Key(err)
    }
}

impl From<InvalidZoneDescriptor> for ScenarioError {
    fn from(err: InvalidZoneDescriptor) -> Self {
        ScenarioError::Zone(err)
    }
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioError::Parse(err) => {
                write!(f, "malformed scenario table: {}", err)
            }
            ScenarioError::Key(err) => err.fmt(f),
            ScenarioError::Zone(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScenarioError::Parse(err) => Some(err),
            ScenarioError::Key(err) => Some(err),
            ScenarioError::Zone(err) => Some(err),
        }
    }
}

//============ Testing =======================================================
