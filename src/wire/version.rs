use crate::identifiers::FormatError;
use std::convert::TryFrom;

/// Wire protocol versions, oldest first. Every version keeps its own serialization proxy, so a
/// new version only ever adds a variant and a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ABIVersion {
    V1 = 1,
    // Adds `max_messages` to ConnectClientSuccess.
    V2 = 2,
    // Adds `snapshot_only` to read and exists requests.
    V3 = 3,
}

impl ABIVersion {
    pub const OLDEST: ABIVersion = ABIVersion::V1;
    pub const CURRENT: ABIVersion = ABIVersion::V3;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Highest version known to this build within `[min, max]`, if any.
    pub fn negotiate(min: u8, max: u8) -> Option<ABIVersion> {
        (min..=max)
            .rev()
            .find_map(|raw| ABIVersion::try_from(raw).ok())
    }
}

impl TryFrom<u8> for ABIVersion {
    type Error = FormatError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(ABIVersion::V1),
            2 => Ok(ABIVersion::V2),
            3 => Ok(ABIVersion::V3),
            other => Err(FormatError::UnsupportedVersion(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_oldest_first() {
        assert!(ABIVersion::V1 < ABIVersion::V2);
        assert!(ABIVersion::V2 < ABIVersion::V3);
        assert_eq!(ABIVersion::CURRENT.as_u8(), 3);
    }

    #[test]
    fn negotiate_highest_common() {
        assert_eq!(ABIVersion::negotiate(1, 3), Some(ABIVersion::V3));
        assert_eq!(ABIVersion::negotiate(1, 2), Some(ABIVersion::V2));
        // A newer peer advertising versions we don't know yet.
        assert_eq!(ABIVersion::negotiate(2, 200), Some(ABIVersion::V3));
        assert_eq!(ABIVersion::negotiate(4, 9), None);
        assert_eq!(ABIVersion::negotiate(3, 1), None);
    }

    #[test]
    fn unknown_version() {
        assert_eq!(ABIVersion::try_from(0), Err(FormatError::UnsupportedVersion(0)));
        assert_eq!(ABIVersion::try_from(4), Err(FormatError::UnsupportedVersion(4)));
    }
}
