//! Packet sections and conformance levels.
//!
//! Section keys double as packet field names, candidate targets, and checklist
//! tags, so every stage agrees on one spelling.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A top-level packet section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Purpose,
    Flow,
    DataContracts,
    ApiContracts,
    Permissions,
    Tenancy,
    FailureModes,
    AuditEvents,
    Nfrs,
    AcceptanceTests,
}

impl Section {
    pub const ALL: [Section; 10] = [
        Section::Purpose,
        Section::Flow,
        Section::DataContracts,
        Section::ApiContracts,
        Section::Permissions,
        Section::Tenancy,
        Section::FailureModes,
        Section::AuditEvents,
        Section::Nfrs,
        Section::AcceptanceTests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Purpose => "purpose",
            Section::Flow => "flow",
            Section::DataContracts => "dataContracts",
            Section::ApiContracts => "apiContracts",
            Section::Permissions => "permissions",
            Section::Tenancy => "tenancy",
            Section::FailureModes => "failureModes",
            Section::AuditEvents => "auditEvents",
            Section::Nfrs => "nfrs",
            Section::AcceptanceTests => "acceptanceTests",
        }
    }

    /// Sections that must never be accepted from inference: authorization,
    /// tenancy isolation, and audit requirements.
    pub fn is_security_sensitive(&self) -> bool {
        matches!(
            self,
            Section::Permissions | Section::Tenancy | Section::AuditEvents
        )
    }

    /// Lowest level whose gate requires this section, if any.
    pub fn required_from(&self) -> Option<Level> {
        Level::ALL
            .into_iter()
            .find(|level| level.introduced_sections().contains(self))
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = UnknownSection;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == value)
            .ok_or_else(|| UnknownSection(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown section type {0:?}")]
pub struct UnknownSection(pub String);

/// A checklist or confirmation target: one section, or the whole packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionTag {
    Section(Section),
    FullPacket,
}

pub const FULL_PACKET_TAG: &str = "full_packet";

impl SectionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionTag::Section(section) => section.as_str(),
            SectionTag::FullPacket => FULL_PACKET_TAG,
        }
    }
}

impl fmt::Display for SectionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionTag {
    type Err = UnknownSection;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == FULL_PACKET_TAG {
            return Ok(SectionTag::FullPacket);
        }
        value.parse().map(SectionTag::Section)
    }
}

impl From<Section> for SectionTag {
    fn from(section: Section) -> Self {
        SectionTag::Section(section)
    }
}

impl Serialize for SectionTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SectionTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Declared conformance tier. Gates nest: level 3 requires everything level 2
/// requires, which requires everything level 1 requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    One,
    Two,
    Three,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::One, Level::Two, Level::Three];

    pub fn number(&self) -> u8 {
        match self {
            Level::One => 1,
            Level::Two => 2,
            Level::Three => 3,
        }
    }

    /// Sections first required at exactly this level.
    pub fn introduced_sections(&self) -> &'static [Section] {
        match self {
            Level::One => &[Section::Purpose, Section::Flow, Section::DataContracts],
            Level::Two => &[
                Section::ApiContracts,
                Section::Permissions,
                Section::FailureModes,
            ],
            Level::Three => &[
                Section::AuditEvents,
                Section::Nfrs,
                Section::AcceptanceTests,
            ],
        }
    }

    /// Every section required at this level, in gate order.
    pub fn required_sections(&self) -> Vec<Section> {
        Level::ALL
            .into_iter()
            .filter(|level| level <= self)
            .flat_map(|level| level.introduced_sections().iter().copied())
            .collect()
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Level::One),
            2 => Ok(Level::Two),
            3 => Ok(Level::Three),
            other => Err(format!("level must be 1, 2, or 3 (got {other})")),
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.number()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let number: u8 = value
            .trim()
            .parse()
            .map_err(|_| format!("level must be 1, 2, or 3 (got {value:?})"))?;
        Level::try_from(number)
    }
}
