//! Wire format versions.

use std::fmt;

/// A `(major, minor)` format version, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    /// Creates a version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Returns true if a stream of this version carries a feature introduced in `since`.
    pub fn supports(self, since: Version) -> bool {
        self >= since
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Version::new(8, 0) > Version::new(7, 9));
        assert!(Version::new(7, 1) > Version::new(7, 0));
        assert!(Version::new(8, 0).supports(Version::new(6, 0)));
        assert!(!Version::new(5, 2).supports(Version::new(6, 0)));
        assert_eq!(Version::new(8, 1).to_string(), "8.1");
    }
}
