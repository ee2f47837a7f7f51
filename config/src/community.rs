// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! BGP standard community tags, used here as opaque labels naming overlay
//! networks on the wire.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::vni::Vni;

/// A BGP standard community (RFC 1997), stored as `(asn << 16) | value`.
///
/// The printable form is `"asn:value"` with both halves decimal and at most
/// 16 bits wide.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Community(u32);

impl Community {
    #[must_use]
    pub fn new(asn: u16, value: u16) -> Community {
        Community((u32::from(asn) << 16) | u32::from(value))
    }

    /// Derive the community naming a VNI under the `asn:vni` convention.
    ///
    /// # Errors
    ///
    /// Fails when the VNI does not fit the 16-bit value half of the tag.
    pub fn for_vni(asn: u16, vni: Vni) -> Result<Community, CommunityError> {
        let value = u16::try_from(vni.as_u32())
            .map_err(|_| CommunityError::VniOverflow(vni.as_u32()))?;
        Ok(Community::new(asn, value))
    }

    #[must_use]
    pub fn asn(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[must_use]
    pub fn value(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for Community {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.asn(), self.value())
    }
}

/// Every 32-bit value is a valid community; this is how tags arriving in a
/// path attribute are interpreted.
impl From<u32> for Community {
    fn from(raw: u32) -> Community {
        Community(raw)
    }
}

impl FromStr for Community {
    type Err = CommunityError;

    fn from_str(s: &str) -> Result<Community, Self::Err> {
        let (asn, value) = s.split_once(':').ok_or(CommunityError::MissingSeparator)?;
        if value.contains(':') {
            return Err(CommunityError::MissingSeparator);
        }
        let asn = asn
            .parse::<u16>()
            .map_err(|_| CommunityError::BadAsn(asn.to_string()))?;
        let value = value
            .parse::<u16>()
            .map_err(|_| CommunityError::BadValue(value.to_string()))?;
        Ok(Community::new(asn, value))
    }
}

impl TryFrom<String> for Community {
    type Error = CommunityError;

    fn try_from(s: String) -> Result<Community, Self::Error> {
        s.parse()
    }
}

impl From<Community> for String {
    fn from(community: Community) -> String {
        community.to_string()
    }
}

/// Errors produced when parsing or deriving a community tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommunityError {
    #[error("community must have the form ASN:VALUE")]
    MissingSeparator,
    #[error("invalid asn field {0:?} (decimal, at most 16 bits)")]
    BadAsn(String),
    #[error("invalid value field {0:?} (decimal, at most 16 bits)")]
    BadValue(String),
    #[error("vni {0} does not fit the 16-bit value half of a community")]
    VniOverflow(u32),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_canonical_form() {
        let community: Community = "65000:100".parse().unwrap();
        assert_eq!(community.asn(), 65000);
        assert_eq!(community.value(), 100);
        assert_eq!(community.as_u32(), (65000u32 << 16) | 100);
    }

    #[test]
    fn reject_malformed_input() {
        assert_eq!(
            "65000".parse::<Community>().unwrap_err(),
            CommunityError::MissingSeparator
        );
        assert_eq!(
            "1:2:3".parse::<Community>().unwrap_err(),
            CommunityError::MissingSeparator
        );
        assert_eq!(
            "65536:1".parse::<Community>().unwrap_err(),
            CommunityError::BadAsn("65536".to_string())
        );
        assert_eq!(
            "1:65536".parse::<Community>().unwrap_err(),
            CommunityError::BadValue("65536".to_string())
        );
        assert_eq!(
            "a:1".parse::<Community>().unwrap_err(),
            CommunityError::BadAsn("a".to_string())
        );
        assert_eq!(
            "-1:1".parse::<Community>().unwrap_err(),
            CommunityError::BadAsn("-1".to_string())
        );
    }

    #[test]
    fn for_vni_requires_16_bit_vni() {
        let small = Vni::new_checked(300).unwrap();
        assert_eq!(
            Community::for_vni(65000, small).unwrap(),
            Community::new(65000, 300)
        );
        let large = Vni::new_checked(70_000).unwrap();
        assert_eq!(
            Community::for_vni(65000, large).unwrap_err(),
            CommunityError::VniOverflow(70_000)
        );
    }

    #[test]
    fn display_roundtrips_through_parse() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|(asn, value): (u16, u16)| {
                let community = Community::new(asn, value);
                let reparsed: Community = community.to_string().parse().unwrap();
                assert_eq!(reparsed, community);
                assert_eq!(reparsed.asn(), asn);
                assert_eq!(reparsed.value(), value);
            });
    }
}
