//! Host platform identification and the capability query the dispatcher
//! consults.
//!
//! # Design
//! Detection is the host's business. The dispatcher only asks a
//! `CapabilitySource` two things: which platform it is running on (for the
//! `User-Agent`) and whether that platform is constrained. Mini-game hosts
//! are the constrained ones: they get a lower timeout ceiling, fewer retries
//! and forced spacing between requests.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Runtime platforms the dispatcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlatformType {
    #[default]
    Unknown,
    Windows,
    Mac,
    Linux,
    Android,
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "WebGL")]
    WebGl,
    WeixinMiniGame,
    DouyinMiniGame,
    Editor,
}

impl PlatformType {
    /// Best guess from the compile target. Mini-game hosts cannot be told
    /// apart from plain WebGL here; embedders report those explicitly.
    pub fn detect() -> Self {
        if cfg!(target_os = "android") {
            PlatformType::Android
        } else if cfg!(target_os = "ios") {
            PlatformType::Ios
        } else if cfg!(target_os = "windows") {
            PlatformType::Windows
        } else if cfg!(target_os = "macos") {
            PlatformType::Mac
        } else if cfg!(target_os = "linux") {
            PlatformType::Linux
        } else if cfg!(target_arch = "wasm32") {
            PlatformType::WebGl
        } else {
            PlatformType::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlatformType::Unknown => "Unknown",
            PlatformType::Windows => "Windows",
            PlatformType::Mac => "Mac",
            PlatformType::Linux => "Linux",
            PlatformType::Android => "Android",
            PlatformType::Ios => "iOS",
            PlatformType::WebGl => "WebGL",
            PlatformType::WeixinMiniGame => "WeixinMiniGame",
            PlatformType::DouyinMiniGame => "DouyinMiniGame",
            PlatformType::Editor => "Editor",
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, PlatformType::Android | PlatformType::Ios)
    }

    pub fn is_mini_game(&self) -> bool {
        matches!(
            self,
            PlatformType::WeixinMiniGame | PlatformType::DouyinMiniGame
        )
    }

    pub fn is_desktop(&self) -> bool {
        matches!(
            self,
            PlatformType::Windows | PlatformType::Mac | PlatformType::Linux
        )
    }

    pub fn is_web(&self) -> bool {
        *self == PlatformType::WebGl || self.is_mini_game()
    }

    pub fn is_editor(&self) -> bool {
        *self == PlatformType::Editor
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only capability query answered by the host.
pub trait CapabilitySource: Send + Sync {
    fn platform(&self) -> PlatformType;

    /// Constrained platforms get the reduced timeout and retry budget and
    /// mandatory spacing between requests.
    fn is_constrained_platform(&self) -> bool {
        self.platform().is_mini_game()
    }
}

/// A fixed platform answers for itself.
impl CapabilitySource for PlatformType {
    fn platform(&self) -> PlatformType {
        *self
    }
}
