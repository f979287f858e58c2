//! The key model: signing key descriptors and per-zone key sets.
//!
//! A [`SigningKey`] describes one key of a zone's signing apparatus as an
//! immutable role/algorithm/state triple plus a reference to the generated
//! key pair on disk. A [`ZoneKeySet`] collects the keys declared for one
//! zone. Both are value objects constructed once per test case from a
//! declarative table and never mutated afterwards.
//!
//! The temporal state of a key is a precomputed label relative to the
//! reference time of the test case, not a timestamp. This keeps everything
//! downstream deterministic: nothing in this module or in the verdict
//! logic ever consults the clock.

use std::fmt;
use std::str::FromStr;

//------------ KeyRole -------------------------------------------------------

/// The role a signing key plays in its zone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyRole {
    /// A key-signing key. It signs the key set, anchoring trust.
    KeySigning,

    /// A zone-signing key. It signs the ordinary zone records.
    ZoneSigning,

    /// A single key carrying both roles at once.
    ///
    /// Single-type signing schemes declare one key that signs both the
    /// key set and the zone. Such a key counts as one key-signing key
    /// and one zone-signing key of its algorithm.
    CombinedSigning,
}

impl KeyRole {
    /// Returns the canonical mnemonic for the role.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyRole::KeySigning => "ksk",
            KeyRole::ZoneSigning => "zsk",
            KeyRole::CombinedSigning => "csk",
        }
    }

    /// Whether a key of this role can vouch for zone-signing keys.
    pub fn signs_keys(self) -> bool {
        matches!(self, KeyRole::KeySigning | KeyRole::CombinedSigning)
    }

    /// Whether a key of this role signs the zone's ordinary records.
    pub fn signs_zone(self) -> bool {
        matches!(self, KeyRole::ZoneSigning | KeyRole::CombinedSigning)
    }
}

impl FromStr for KeyRole {
    type Err = InvalidKeyDescriptor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ksk" => Ok(KeyRole::KeySigning),
            "zsk" => Ok(KeyRole::ZoneSigning),
            "csk" => Ok(KeyRole::CombinedSigning),
            _ => Err(InvalidKeyDescriptor::UnknownRole(s.into())),
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//------------ KeyState ------------------------------------------------------

/// The temporal state of a signing key.
///
/// The variants follow a key through its lifecycle. Only an `Active` key
/// signs anything; all other states describe keys that are on their way
/// in or out and must not be relied upon for new signatures.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyState {
    /// Not yet published in the zone.
    Future,

    /// Published in the key set but not yet signing.
    Published,

    /// Published and signing.
    Active,

    /// Still published but no longer signing.
    Inactive,

    /// Withdrawn from service.
    Retired,
}

impl KeyState {
    /// Returns the canonical mnemonic for the state.
    pub fn as_str(self) -> &'static str {
        match self {
            KeyState::Future => "future",
            KeyState::Published => "published",
            KeyState::Active => "active",
            KeyState::Inactive => "inactive",
            KeyState::Retired => "retired",
        }
    }

    /// Whether a key in this state may produce or cover signatures.
    pub fn is_usable(self) -> bool {
        matches!(self, KeyState::Active)
    }
}

impl FromStr for KeyState {
    type Err = InvalidKeyDescriptor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "future" => Ok(KeyState::Future),
            "published" => Ok(KeyState::Published),
            "active" => Ok(KeyState::Active),
            "inactive" => Ok(KeyState::Inactive),
            "retired" => Ok(KeyState::Retired),
            _ => Err(InvalidKeyDescriptor::UnknownState(s.into())),
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//------------ Algorithm -----------------------------------------------------

/// A DNSSEC security algorithm number.
///
/// Algorithms are opaque identifiers: they compare for equality and hash
/// but have no meaningful order. For the currently registered values see
/// the IANA DNS security algorithm numbers registry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Algorithm(u8);

impl Algorithm {
    /// RSA/SHA-1.
    pub const RSASHA1: Algorithm = Algorithm(5);

    /// RSA/SHA-256.
    pub const RSASHA256: Algorithm = Algorithm(8);

    /// RSA/SHA-512.
    pub const RSASHA512: Algorithm = Algorithm(10);

    /// ECDSA Curve P-256 with SHA-256.
    pub const ECDSAP256SHA256: Algorithm = Algorithm(13);

    /// ECDSA Curve P-384 with SHA-384.
    pub const ECDSAP384SHA384: Algorithm = Algorithm(14);

    /// ED25519.
    pub const ED25519: Algorithm = Algorithm(15);

    /// ED448.
    pub const ED448: Algorithm = Algorithm(16);

    /// Creates an algorithm from its registry number.
    pub fn from_int(value: u8) -> Self {
        Algorithm(value)
    }

    /// Returns the registry number.
    pub fn to_int(self) -> u8 {
        self.0
    }

    /// Returns the well-known mnemonic, if there is one.
    pub fn to_mnemonic(self) -> Option<&'static str> {
        match self.0 {
            5 => Some("RSASHA1"),
            8 => Some("RSASHA256"),
            10 => Some("RSASHA512"),
            13 => Some("ECDSAP256SHA256"),
            14 => Some("ECDSAP384SHA384"),
            15 => Some("ED25519"),
            16 => Some("ED448"),
            _ => None,
        }
    }
}

impl FromStr for Algorithm {
    type Err = InvalidKeyDescriptor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSASHA1" => Ok(Algorithm::RSASHA1),
            "RSASHA256" => Ok(Algorithm::RSASHA256),
            "RSASHA512" => Ok(Algorithm::RSASHA512),
            "ECDSAP256SHA256" => Ok(Algorithm::ECDSAP256SHA256),
            "ECDSAP384SHA384" => Ok(Algorithm::ECDSAP384SHA384),
            "ED25519" => Ok(Algorithm::ED25519),
            "ED448" => Ok(Algorithm::ED448),
            _ => match s.parse::<u8>() {
                Ok(value) => Ok(Algorithm::from_int(value)),
                Err(_) => {
                    Err(InvalidKeyDescriptor::UnknownAlgorithm(s.into()))
                }
            },
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_mnemonic() {
            Some(mnemonic) => f.write_str(mnemonic),
            None => write!(f, "{}", self.0),
        }
    }
}

//------------ SigningKey ----------------------------------------------------

/// One signing key of a zone.
///
/// The `pubref` names the generated key pair on disk, the way key files
/// are referenced by the zone materialization collaborator. It is also
/// what makes a key's identity: two keys with the same role, algorithm
/// and state are distinct keys as long as their `pubref`s differ.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SigningKey {
    /// Reference to the public key file of the generated key pair.
    pubref: String,

    /// The role of the key.
    role: KeyRole,

    /// The security algorithm of the key.
    algorithm: Algorithm,

    /// The temporal state of the key.
    state: KeyState,
}

impl SigningKey {
    /// Creates a new key descriptor.
    ///
    /// Fails if `pubref` is empty.
    pub fn new(
        pubref: impl Into<String>,
        role: KeyRole,
        algorithm: Algorithm,
        state: KeyState,
    ) -> Result<Self, InvalidKeyDescriptor> {
        let pubref = pubref.into();
        if pubref.is_empty() {
            return Err(InvalidKeyDescriptor::EmptyKeyRef);
        }
        Ok(SigningKey {
            pubref,
            role,
            algorithm,
            state,
        })
    }

    /// Returns the reference to the key pair on disk.
    pub fn pubref(&self) -> &str {
        &self.pubref
    }

    /// Returns the role of the key.
    pub fn role(&self) -> KeyRole {
        self.role
    }

    /// Returns the security algorithm of the key.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Returns the temporal state of the key.
    pub fn state(&self) -> KeyState {
        self.state
    }
}

impl fmt::Display for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {} {})",
            self.pubref, self.role, self.algorithm, self.state
        )
    }
}

//------------ ZoneKeySet ----------------------------------------------------

/// The keys declared for one zone.
///
/// The order of the keys is irrelevant for the verdict and only kept for
/// deterministic zone file generation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneKeySet {
    /// The name of the zone.
    name: String,

    /// The declared keys.
    keys: Vec<SigningKey>,
}

impl ZoneKeySet {
    /// Creates a key set for a zone.
    ///
    /// Fails if the zone name is empty or not a well-formed domain name,
    /// or if two keys share a `pubref`.
    pub fn new(
        name: impl Into<String>,
        keys: Vec<SigningKey>,
    ) -> Result<Self, InvalidZoneDescriptor> {
        let name = name.into();
        check_zone_name(&name)?;
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].iter().any(|k| k.pubref == key.pubref) {
                return Err(InvalidZoneDescriptor::DuplicateKeyRef(
                    key.pubref.clone(),
                ));
            }
        }
        Ok(ZoneKeySet { name, keys })
    }

    /// Returns the name of the zone.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared keys.
    pub fn keys(&self) -> &[SigningKey] {
        &self.keys
    }
}

//------------ Helper Functions ----------------------------------------------

/// Checks that a zone name is a well-formed domain name.
///
/// A single trailing dot is allowed. The empty label check also covers
/// names that are only a dot, which denote the root and cannot name a
/// test zone.
fn check_zone_name(name: &str) -> Result<(), InvalidZoneDescriptor> {
    if name.is_empty() {
        return Err(InvalidZoneDescriptor::EmptyZoneName);
    }
    let relative = name.strip_suffix('.').unwrap_or(name);
    if relative.len() > 253 {
        return Err(InvalidZoneDescriptor::BadZoneName(name.into()));
    }
    for label in relative.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(InvalidZoneDescriptor::BadZoneName(name.into()));
        }
    }
    Ok(())
}

//------------ InvalidKeyDescriptor ------------------------------------------

/// A key descriptor was malformed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InvalidKeyDescriptor {
    /// The key pair reference was empty.
    EmptyKeyRef,

    /// The role was not one of the known role mnemonics.
    UnknownRole(String),

    /// The temporal state was not one of the known state mnemonics.
    UnknownState(String),

    /// The algorithm was neither a known mnemonic nor a number.
    UnknownAlgorithm(String),
}

impl fmt::Display for InvalidKeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidKeyDescriptor::EmptyKeyRef => {
                write!(f, "empty key pair reference")
            }
            InvalidKeyDescriptor::UnknownRole(s) => {
                write!(f, "unknown key role '{}'", s)
            }
            InvalidKeyDescriptor::UnknownState(s) => {
                write!(f, "unknown key state '{}'", s)
            }
            InvalidKeyDescriptor::UnknownAlgorithm(s) => {
                write!(f, "unknown algorithm '{}'", s)
            }
        }
    }
}

impl std::error::Error for InvalidKeyDescriptor {}

//------------ InvalidZoneDescriptor -----------------------------------------

/// A zone descriptor was malformed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InvalidZoneDescriptor {
    /// The zone name was empty.
    EmptyZoneName,

    /// The zone name was not a well-formed domain name.
    BadZoneName(String),

    /// Two keys shared the same key pair reference.
    DuplicateKeyRef(String),
}

impl fmt::Display for InvalidZoneDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidZoneDescriptor::EmptyZoneName => {
                write!(f, "empty zone name")
            }
            InvalidZoneDescriptor::BadZoneName(name) => {
                write!(f, "malformed zone name '{}'", name)
            }
            InvalidZoneDescriptor::DuplicateKeyRef(pubref) => {
                write!(f, "duplicate key reference '{}'", pubref)
            }
        }
    }
}

impl std::error::Error for InvalidZoneDescriptor {}

//============ Testing =======================================================
