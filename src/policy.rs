//! The verdict function: from a zone's key set to its expected outcome.
//!
//! A zone signed with a broken key setup must not be served as valid. The
//! rule implemented here is the conservative reading of DNSSEC key
//! management: signatures made by a zone-signing key only verify if a
//! usable key-signing key of the *same* algorithm vouches for it, and
//! every algorithm that is actively signing must form such a pair on its
//! own. A half-rolled algorithm must not ride along on the strength of
//! another one, otherwise a broken algorithm would go undetected.

use std::collections::HashMap;
use std::fmt;

use crate::keyset::{Algorithm, ZoneKeySet};

//------------ Verdict -------------------------------------------------------

/// The expected validation outcome for a zone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Verdict {
    /// The server must answer authoritative queries with success.
    Valid,

    /// The server must refuse to serve signed answers for the zone.
    Invalid,
}

impl Verdict {
    /// Whether the verdict is [`Verdict::Valid`].
    pub fn is_valid(self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Valid => f.write_str("valid"),
            Verdict::Invalid => f.write_str("invalid"),
        }
    }
}

//------------ evaluate ------------------------------------------------------

/// Per-algorithm tally of the usable keys.
#[derive(Default)]
struct Tally {
    /// A usable key-signing key exists for the algorithm.
    ksk: bool,

    /// A usable zone-signing key exists for the algorithm.
    zsk: bool,
}

/// Computes the expected validation outcome for a zone's key set.
///
/// This is a pure function of the key set. Keys that are not in their
/// active period do not take part: a future or merely published key signs
/// nothing yet, an inactive or retired key must not be relied upon for
/// new signatures.
///
/// An algorithm is in play as soon as it has at least one usable key of
/// either role. The zone is valid if at least one algorithm is in play
/// and every algorithm in play has both a usable key-signing and a usable
/// zone-signing key. A combined key satisfies both roles at once, but
/// only for its own algorithm; cross-algorithm pairings never form a
/// chain of trust.
pub fn evaluate(set: &ZoneKeySet) -> Verdict {
    let mut groups: HashMap<Algorithm, Tally> = HashMap::new();
    for key in set.keys() {
        if !key.state().is_usable() {
            continue;
        }
        let tally = groups.entry(key.algorithm()).or_default();
        if key.role().signs_keys() {
            tally.ksk = true;
        }
        if key.role().signs_zone() {
            tally.zsk = true;
        }
    }
    if groups.is_empty() {
        return Verdict::Invalid;
    }
    if groups.values().all(|tally| tally.ksk && tally.zsk) {
        Verdict::Valid
    } else {
        Verdict::Invalid
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::keyset::{KeyRole, KeyState, SigningKey};
    use rstest::rstest;

    const RSA: Algorithm = Algorithm::RSASHA256;
    const RSA512: Algorithm = Algorithm::RSASHA512;
    const ECDSA: Algorithm = Algorithm::ECDSAP256SHA256;

    /// Builds a key set from (role, algorithm, state) triples.
    fn set(keys: &[(KeyRole, Algorithm, KeyState)]) -> ZoneKeySet {
        let keys = keys
            .iter()
            .enumerate()
            .map(|(i, &(role, algorithm, state))| {
                SigningKey::new(format!("key-{}", i), role, algorithm, state)
                    .unwrap()
            })
            .collect();
        ZoneKeySet::new("example.com", keys).unwrap()
    }

    use KeyRole::{CombinedSigning as Csk, KeySigning as Ksk, ZoneSigning as Zsk};
    use KeyState::{Active, Future, Inactive, Published, Retired};

    #[rstest]
    // A plain split setup with one algorithm.
    #[case::rsa(&[(Ksk, RSA, Active), (Zsk, RSA, Active)], Verdict::Valid)]
    // Two algorithms, both completely paired.
    #[case::rsa_ecdsa(
        &[(Ksk, RSA, Active), (Zsk, RSA, Active),
          (Ksk, ECDSA, Active), (Zsk, ECDSA, Active)],
        Verdict::Valid
    )]
    // A second algorithm that only exists in the future is not in play.
    #[case::rsa_now_ecdsa_future(
        &[(Ksk, RSA, Active), (Zsk, RSA, Active),
          (Ksk, ECDSA, Future), (Zsk, ECDSA, Future)],
        Verdict::Valid
    )]
    // Mid-rollover: the incoming algorithm is already fully paired.
    #[case::rsa_ecdsa_roll(
        &[(Ksk, RSA, Active), (Zsk, RSA, Active), (Zsk, RSA, Retired),
          (Ksk, ECDSA, Active), (Zsk, ECDSA, Active)],
        Verdict::Valid
    )]
    // Single-type signing: one combined key pairs with itself.
    #[case::stss_ksk(&[(Csk, RSA, Active)], Verdict::Valid)]
    #[case::stss_zsk(&[(Csk, ECDSA, Active)], Verdict::Valid)]
    // Two combined keys of the same algorithm.
    #[case::stss_two_ksk(
        &[(Csk, RSA, Active), (Csk, RSA, Active)],
        Verdict::Valid
    )]
    // Two single-type algorithms, each self-sufficient.
    #[case::stss_rsa256_rsa512(
        &[(Csk, RSA, Active), (Csk, RSA512, Active)],
        Verdict::Valid
    )]
    // A split algorithm next to a single-type one.
    #[case::rsa_split_ecdsa_stss(
        &[(Ksk, RSA, Active), (Zsk, RSA, Active), (Csk, ECDSA, Active)],
        Verdict::Valid
    )]
    // Nothing is signing yet.
    #[case::rsa_future_all(
        &[(Ksk, RSA, Future), (Zsk, RSA, Future)],
        Verdict::Invalid
    )]
    // Published keys are present but sign nothing.
    #[case::rsa_future_publish(
        &[(Ksk, RSA, Published), (Zsk, RSA, Published)],
        Verdict::Invalid
    )]
    // Only one half of the pair has reached its active period.
    #[case::rsa_future_active(
        &[(Ksk, RSA, Active), (Zsk, RSA, Future)],
        Verdict::Invalid
    )]
    // The zone-signing key has gone inactive with no replacement.
    #[case::rsa_inactive_zsk(
        &[(Ksk, RSA, Active), (Zsk, RSA, Inactive)],
        Verdict::Invalid
    )]
    // No zone-signing key at all.
    #[case::rsa_no_zsk(&[(Ksk, RSA, Active)], Verdict::Invalid)]
    fn scenario_table(
        #[case] keys: &[(KeyRole, Algorithm, KeyState)],
        #[case] expected: Verdict,
    ) {
        assert_eq!(evaluate(&set(keys)), expected);
    }

    #[test]
    fn no_keys_is_invalid() {
        assert_eq!(evaluate(&set(&[])), Verdict::Invalid);
    }

    #[test]
    fn any_usable_ksk_in_a_group_suffices() {
        let keys = set(&[
            (Ksk, RSA, Retired),
            (Ksk, RSA, Active),
            (Ksk, RSA, Future),
            (Zsk, RSA, Active),
        ]);
        assert_eq!(evaluate(&keys), Verdict::Valid);
    }

    #[test]
    fn active_zsk_with_inactive_ksk_is_invalid() {
        let keys = set(&[(Ksk, RSA, Inactive), (Zsk, RSA, Active)]);
        assert_eq!(evaluate(&keys), Verdict::Invalid);
    }

    #[test]
    fn pairing_is_per_algorithm() {
        // A usable pair cannot be assembled across algorithms.
        let keys = set(&[(Ksk, RSA, Active), (Zsk, ECDSA, Active)]);
        assert_eq!(evaluate(&keys), Verdict::Invalid);
    }

    #[test]
    fn orphaned_active_group_breaks_the_zone() {
        // A complete group does not compensate for an incomplete one.
        let keys = set(&[
            (Ksk, RSA, Active),
            (Zsk, RSA, Active),
            (Ksk, ECDSA, Active),
        ]);
        assert_eq!(evaluate(&keys), Verdict::Invalid);
    }

    #[test]
    fn dormant_group_is_ignored() {
        let keys = set(&[
            (Ksk, RSA, Active),
            (Zsk, RSA, Active),
            (Ksk, ECDSA, Published),
            (Zsk, ECDSA, Retired),
        ]);
        assert_eq!(evaluate(&keys), Verdict::Valid);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let keys = set(&[(Ksk, RSA, Active), (Zsk, RSA, Inactive)]);
        assert_eq!(evaluate(&keys), evaluate(&keys));
    }
}
