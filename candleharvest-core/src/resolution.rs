//! Candle resolutions — the fixed token set the remote accepts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DownloadError;

/// Candle resolution accepted by the candles endpoint.
///
/// Tokens are validated before any request is issued; an unknown token is
/// rejected locally with [`DownloadError::UnsupportedResolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "3m")]
    Min3,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "6h")]
    Hour6,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "3d")]
    Day3,
    #[serde(rename = "1w")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl Resolution {
    /// Every supported resolution, shortest first.
    pub const ALL: [Resolution; 14] = [
        Resolution::Min1,
        Resolution::Min3,
        Resolution::Min5,
        Resolution::Min15,
        Resolution::Min30,
        Resolution::Hour1,
        Resolution::Hour2,
        Resolution::Hour4,
        Resolution::Hour6,
        Resolution::Hour12,
        Resolution::Day1,
        Resolution::Day3,
        Resolution::Week1,
        Resolution::Month1,
    ];

    /// Duration of one candle in minutes. A month is the conventional 30 days.
    pub fn minutes(self) -> u32 {
        match self {
            Resolution::Min1 => 1,
            Resolution::Min3 => 3,
            Resolution::Min5 => 5,
            Resolution::Min15 => 15,
            Resolution::Min30 => 30,
            Resolution::Hour1 => 60,
            Resolution::Hour2 => 120,
            Resolution::Hour4 => 240,
            Resolution::Hour6 => 360,
            Resolution::Hour12 => 720,
            Resolution::Day1 => 1440,
            Resolution::Day3 => 4320,
            Resolution::Week1 => 10_080,
            Resolution::Month1 => 43_200,
        }
    }

    /// The wire token, e.g. `"1h"`.
    pub fn token(self) -> &'static str {
        match self {
            Resolution::Min1 => "1m",
            Resolution::Min3 => "3m",
            Resolution::Min5 => "5m",
            Resolution::Min15 => "15m",
            Resolution::Min30 => "30m",
            Resolution::Hour1 => "1h",
            Resolution::Hour2 => "2h",
            Resolution::Hour4 => "4h",
            Resolution::Hour6 => "6h",
            Resolution::Hour12 => "12h",
            Resolution::Day1 => "1d",
            Resolution::Day3 => "3d",
            Resolution::Week1 => "1w",
            Resolution::Month1 => "1M",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Resolution {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resolution::ALL
            .iter()
            .copied()
            .find(|r| r.token() == s)
            .ok_or_else(|| DownloadError::UnsupportedResolution {
                token: s.to_string(),
            })
    }
}
