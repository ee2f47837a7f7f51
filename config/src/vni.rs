// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::{Display, Formatter};
use std::num::NonZero;

/// A [VXLAN][RFC7348] Network Identifier.
///
/// A `Vni` is a 24-bit value naming one overlay network. Zero is reserved by
/// the kernel's vxlan driver and by most EVPN implementations, so it is not
/// representable here; use [`Vni::new_checked`] to validate a raw `u32`.
///
/// [RFC7348]: https://datatracker.ietf.org/doc/html/rfc7348#section-5
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(transparent)]
pub struct Vni(NonZero<u32>);

impl Display for Vni {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl Vni {
    /// The maximum legal [`Vni`] value (2<sup>24</sup> - 1).
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Create a [`Vni`] from a `u32`, rejecting 0 and values above [`Vni::MAX`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidVni`] when the value is out of range.
    pub fn new_checked(vni: u32) -> Result<Vni, InvalidVni> {
        match NonZero::<u32>::new(vni) {
            None => Err(InvalidVni::ReservedZero),
            _ if vni > Vni::MAX => Err(InvalidVni::TooLarge(vni)),
            Some(vni) => Ok(Vni(vni)),
        }
    }

    /// Get the value of the [`Vni`] as a `u32`.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl From<Vni> for u32 {
    fn from(vni: Vni) -> u32 {
        vni.as_u32()
    }
}

impl TryFrom<u32> for Vni {
    type Error = InvalidVni;

    fn try_from(vni: u32) -> Result<Vni, Self::Error> {
        Vni::new_checked(vni)
    }
}

/// Errors that can occur when validating a raw VNI value.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidVni {
    #[error("zero is not a legal vni")]
    ReservedZero,
    #[error("the value {0} is too large to be a vni (max is {MAX})", MAX = Vni::MAX)]
    TooLarge(u32),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_is_not_a_legal_vni() {
        assert_eq!(Vni::new_checked(0).unwrap_err(), InvalidVni::ReservedZero);
    }

    #[test]
    fn bounds_are_inclusive() {
        assert_eq!(Vni::new_checked(1).unwrap().as_u32(), 1);
        assert_eq!(Vni::new_checked(Vni::MAX).unwrap().as_u32(), Vni::MAX);
        assert_eq!(
            Vni::new_checked(Vni::MAX + 1).unwrap_err(),
            InvalidVni::TooLarge(Vni::MAX + 1)
        );
    }

    #[test]
    fn try_from_complies_with_contract() {
        bolero::check!()
            .with_type()
            .cloned()
            .for_each(|raw: u32| match Vni::try_from(raw) {
                Ok(vni) => {
                    assert_eq!(vni.as_u32(), raw);
                    assert_ne!(vni.as_u32(), 0);
                    assert!(vni.as_u32() <= Vni::MAX);
                }
                Err(InvalidVni::ReservedZero) => assert_eq!(raw, 0),
                Err(InvalidVni::TooLarge(val)) => {
                    assert_eq!(raw, val);
                    assert!(raw > Vni::MAX);
                }
            });
    }
}
