// SPDX-License-Identifier: GPL-3.0-only

//! Session-wide constants and typed camera parameters

use serde::{Deserialize, Serialize};
use std::fmt;

/// White balance presets understood by the capture stage
///
/// The index order is the host-facing integer encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WhiteBalanceMode {
    #[default]
    Auto,
    Daylight,
    CloudyDaylight,
    Twilight,
    Incandescent,
    Fluorescent,
    Manual,
    WarmFluorescent,
    Shade,
}

impl WhiteBalanceMode {
    /// All modes in host index order
    pub const ALL: [WhiteBalanceMode; 9] = [
        WhiteBalanceMode::Auto,
        WhiteBalanceMode::Daylight,
        WhiteBalanceMode::CloudyDaylight,
        WhiteBalanceMode::Twilight,
        WhiteBalanceMode::Incandescent,
        WhiteBalanceMode::Fluorescent,
        WhiteBalanceMode::Manual,
        WhiteBalanceMode::WarmFluorescent,
        WhiteBalanceMode::Shade,
    ];

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn index(&self) -> i32 {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0) as i32
    }

    /// Host-side mode name (e.g. "cloudy-daylight")
    pub fn name(&self) -> &'static str {
        match self {
            WhiteBalanceMode::Auto => "auto",
            WhiteBalanceMode::Daylight => "daylight",
            WhiteBalanceMode::CloudyDaylight => "cloudy-daylight",
            WhiteBalanceMode::Twilight => "twilight",
            WhiteBalanceMode::Incandescent => "incandescent",
            WhiteBalanceMode::Fluorescent => "fluorescent",
            WhiteBalanceMode::Manual => "manual",
            WhiteBalanceMode::WarmFluorescent => "warm-fluorescent",
            WhiteBalanceMode::Shade => "shade",
        }
    }

    /// Parse a mode name, falling back to `Auto` for anything unknown
    pub fn from_name(name: &str) -> Self {
        match Self::ALL.iter().find(|m| m.name() == name) {
            Some(mode) => *mode,
            None => {
                tracing::debug!(name, "Invalid white balance mode, using auto");
                WhiteBalanceMode::Auto
            }
        }
    }
}

impl fmt::Display for WhiteBalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Orientation applied by the rendering stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotateMethod {
    #[default]
    Identity,
    Clockwise,
    Rotate180,
    Counterclockwise,
    HorizontalFlip,
    VerticalFlip,
    UpperLeftDiagonal,
    UpperRightDiagonal,
    Automatic,
}

impl RotateMethod {
    /// All methods in host index order
    pub const ALL: [RotateMethod; 9] = [
        RotateMethod::Identity,
        RotateMethod::Clockwise,
        RotateMethod::Rotate180,
        RotateMethod::Counterclockwise,
        RotateMethod::HorizontalFlip,
        RotateMethod::VerticalFlip,
        RotateMethod::UpperLeftDiagonal,
        RotateMethod::UpperRightDiagonal,
        RotateMethod::Automatic,
    ];

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn index(&self) -> i32 {
        Self::ALL.iter().position(|m| m == self).unwrap_or(0) as i32
    }

    /// Enum nick of the sink's `rotate-method` property
    pub fn nick(&self) -> &'static str {
        match self {
            RotateMethod::Identity => "identity",
            RotateMethod::Clockwise => "90r",
            RotateMethod::Rotate180 => "180",
            RotateMethod::Counterclockwise => "90l",
            RotateMethod::HorizontalFlip => "horiz",
            RotateMethod::VerticalFlip => "vert",
            RotateMethod::UpperLeftDiagonal => "ul-lr",
            RotateMethod::UpperRightDiagonal => "ur-ll",
            RotateMethod::Automatic => "auto",
        }
    }
}

impl fmt::Display for RotateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nick())
    }
}

/// Names given to the graph and its stages
pub mod pipeline {
    /// Name of the top-level pipeline object
    pub const PIPELINE_NAME: &str = "camera-pipeline";

    /// Capture stage
    pub const SOURCE_NAME: &str = "source";

    /// Format constraint stage
    pub const FILTER_NAME: &str = "filter";

    /// Rendering stage
    pub const SINK_NAME: &str = "vsink";

    /// Media type used for output geometry constraints
    pub const RAW_VIDEO_CAPS: &str = "video/x-raw";

    /// Default capture element
    pub const DEFAULT_SOURCE_ELEMENT: &str = "ahcsrc";

    /// Default rendering element
    pub const DEFAULT_SINK_ELEMENT: &str = "glimagesink";
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// How long the worker waits for the forced NULL confirmation after an error
    pub const ERROR_STOP_TIMEOUT_MS: u64 = 2000;

    /// Upper bound for the final NULL transition during teardown
    pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

    /// CLI status polling interval
    pub const CLI_POLL_INTERVAL: Duration = Duration::from_millis(100);
}

/// Worker thread naming
pub mod threads {
    /// Prefix of every session worker thread name
    pub const WORKER_THREAD_PREFIX: &str = "camera-session";
}

/// Configuration file location
pub mod config_file {
    /// Directory under the user's config dir
    pub const DIR_NAME: &str = "camera-session";

    /// File name inside [`DIR_NAME`]
    pub const FILE_NAME: &str = "config.json";
}

/// Build information
pub mod app_info {
    /// Version string baked in at build time
    pub fn version() -> &'static str {
        env!("SESSION_BUILD_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_balance_index_round_trip() {
        assert_eq!(WhiteBalanceMode::from_index(0), Some(WhiteBalanceMode::Auto));
        assert_eq!(WhiteBalanceMode::from_index(8), Some(WhiteBalanceMode::Shade));
        assert_eq!(WhiteBalanceMode::Manual.index(), 6);
        assert_eq!(WhiteBalanceMode::from_index(9), None);
        assert_eq!(WhiteBalanceMode::from_index(-1), None);
    }

    #[test]
    fn test_white_balance_unknown_name_falls_back_to_auto() {
        assert_eq!(WhiteBalanceMode::from_name("shade"), WhiteBalanceMode::Shade);
        assert_eq!(WhiteBalanceMode::from_name("neon"), WhiteBalanceMode::Auto);
    }

    #[test]
    fn test_rotate_nicks() {
        assert_eq!(RotateMethod::Clockwise.nick(), "90r");
        assert_eq!(RotateMethod::from_index(8), Some(RotateMethod::Automatic));
        assert_eq!(RotateMethod::from_index(42), None);
    }
}
