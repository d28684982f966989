//! Sensor channel naming

use crate::error::UnknownChannel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of gas channels used for feature extraction
pub const NUM_CHANNELS: usize = 8;

/// Gas sensor channels in device order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "MQ2")]
    Mq2,
    #[serde(rename = "MQ3")]
    Mq3,
    #[serde(rename = "MQ4")]
    Mq4,
    #[serde(rename = "MQ6")]
    Mq6,
    #[serde(rename = "MQ7")]
    Mq7,
    #[serde(rename = "MQ8")]
    Mq8,
    #[serde(rename = "MQ135")]
    Mq135,
    #[serde(rename = "QCM")]
    Qcm,
}

impl Channel {
    /// All channels, in the order the device reports them
    pub const ALL: [Channel; NUM_CHANNELS] = [
        Channel::Mq2,
        Channel::Mq3,
        Channel::Mq4,
        Channel::Mq6,
        Channel::Mq7,
        Channel::Mq8,
        Channel::Mq135,
        Channel::Qcm,
    ];

    /// Canonical column name, also the prefix of the channel's feature names
    pub fn name(self) -> &'static str {
        match self {
            Channel::Mq2 => "MQ2",
            Channel::Mq3 => "MQ3",
            Channel::Mq4 => "MQ4",
            Channel::Mq6 => "MQ6",
            Channel::Mq7 => "MQ7",
            Channel::Mq8 => "MQ8",
            Channel::Mq135 => "MQ135",
            Channel::Qcm => "QCM",
        }
    }

    /// Resolve a column header to a channel, ignoring case, whitespace,
    /// hyphens and underscores (`" mq-135"` resolves to `MQ135`)
    pub fn from_name(name: &str) -> Option<Self> {
        let key = normalize_column_name(name);
        Self::ALL.into_iter().find(|c| c.name() == key)
    }

    /// Position of the channel in a raw device line
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::from_name(s).ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// Normalize a column header for channel matching
pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_ignores_case_and_whitespace() {
        assert_eq!(Channel::from_name(" MQ 3"), Some(Channel::Mq3));
        assert_eq!(Channel::from_name("mq3"), Some(Channel::Mq3));
        assert_eq!(Channel::from_name("MQ-135"), Some(Channel::Mq135));
        assert_eq!(Channel::from_name("qcm "), Some(Channel::Qcm));
    }

    #[test]
    fn test_from_name_rejects_unknown() {
        assert_eq!(Channel::from_name("Temp"), None);
        assert_eq!(Channel::from_name("MQ13"), None);
        assert!("MQ9".parse::<Channel>().is_err());
    }

    #[test]
    fn test_index_matches_device_order() {
        for (i, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), i);
        }
    }
}
