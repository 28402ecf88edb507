use serde::{Deserialize, Serialize};

/// Target output resolution for a transcoding job.
///
/// Each variant carries the fixed encoding ladder for this service: output
/// dimensions, video bitrate, and queue priority (lower runs first).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Low,
    Medium,
    High,
}

impl Resolution {
    /// All resolutions in queue-priority order.
    pub const ALL: [Resolution; 3] = [Resolution::Low, Resolution::Medium, Resolution::High];

    /// Output dimensions as (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Low => (640, 360),
            Resolution::Medium => (1280, 720),
            Resolution::High => (1920, 1080),
        }
    }

    /// Target video bitrate in kbps.
    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            Resolution::Low => 800,
            Resolution::Medium => 2500,
            Resolution::High => 5000,
        }
    }

    /// Encoder buffer size in kbps (2x the target bitrate).
    pub fn bufsize_kbps(&self) -> u32 {
        self.bitrate_kbps() * 2
    }

    /// Queue priority; lower values are dispatched first.
    pub fn priority(&self) -> u8 {
        match self {
            Resolution::Low => 1,
            Resolution::Medium => 2,
            Resolution::High => 3,
        }
    }

    /// Name used on the wire and in on-disk paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Low => "low",
            Resolution::Medium => "medium",
            Resolution::High => "high",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Resolution::Low),
            "medium" => Ok(Resolution::Medium),
            "high" => Ok(Resolution::High),
            _ => Err(format!("Invalid resolution: {}", s)),
        }
    }
}
