use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BazelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Anything after the patch number, `rc1` in `6.0.0rc1`. Not used for ordering
    /// beyond tie breaking.
    pub qualifier: Option<String>,
}

impl BazelVersion {
    pub const MINIMUM: BazelVersion = BazelVersion {
        major: 1,
        minor: 0,
        patch: 0,
        qualifier: None,
    };

    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            qualifier: None,
        }
    }

    pub fn parse(raw: &str) -> Option<BazelVersion> {
        lazy_static! {
            static ref VERSION_RE: Regex =
                Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)([^0-9].*)?$").unwrap();
        }
        let captures = VERSION_RE.captures(raw.trim())?;
        let number = |idx: usize| captures.get(idx)?.as_str().parse::<u32>().ok();
        Some(BazelVersion {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            qualifier: captures.get(4).map(|m| m.as_str().to_string()),
        })
    }

    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        (self.major, self.minor, self.patch) >= (major, minor, patch)
    }

    pub fn is_supported(&self) -> bool {
        self.at_least(Self::MINIMUM.major, Self::MINIMUM.minor, Self::MINIMUM.patch)
    }
}

impl Default for BazelVersion {
    // Assume a modern bazel until `version` has been asked.
    fn default() -> Self {
        BazelVersion::new(6, 0, 0)
    }
}

impl fmt::Display for BazelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(q) = self.qualifier.as_ref() {
            f.write_str(q)?;
        }
        Ok(())
    }
}

impl FromStr for BazelVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BazelVersion::parse(s).ok_or_else(|| format!("Unable to parse bazel version `{}`", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(BazelVersion::parse("6.4.0"), Some(BazelVersion::new(6, 4, 0)));
        let rc = BazelVersion::parse("7.0.0rc2").unwrap();
        assert_eq!(rc.qualifier.as_deref(), Some("rc2"));
        assert_eq!(rc.to_string(), "7.0.0rc2");
        assert_eq!(
            BazelVersion::parse("5.3.2- (@non-git)").unwrap().qualifier.as_deref(),
            Some("- (@non-git)")
        );
        assert_eq!(BazelVersion::parse("development version"), None);
        assert_eq!(BazelVersion::parse("6.4"), None);
    }

    #[test]
    fn test_ordering() {
        assert!(BazelVersion::new(0, 29, 1) < BazelVersion::MINIMUM);
        assert!(BazelVersion::new(10, 0, 0) > BazelVersion::new(9, 9, 9));
        assert!(BazelVersion::new(6, 0, 0).at_least(6, 0, 0));
        assert!(!BazelVersion::new(5, 4, 1).at_least(6, 0, 0));
        assert!(!BazelVersion::new(0, 29, 1).is_supported());
        assert!(BazelVersion::new(1, 0, 0).is_supported());
    }
}
