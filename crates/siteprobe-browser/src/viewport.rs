use serde::Serialize;

/// A named viewport size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const MOBILE: Self = Self {
        name: "mobile",
        width: 375,
        height: 667,
    };

    pub const TABLET: Self = Self {
        name: "tablet",
        width: 768,
        height: 1024,
    };

    pub const DESKTOP: Self = Self {
        name: "desktop",
        width: 1920,
        height: 1080,
    };

    /// Presets used for per-scan screenshots.
    pub const SCREENSHOT_PRESETS: [Self; 3] = [Self::MOBILE, Self::TABLET, Self::DESKTOP];
}

/// How every audit session presents itself to the target site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl ClientIdentity {
    pub fn from_config(config: &siteprobe_core::BrowserConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
        }
    }
}
