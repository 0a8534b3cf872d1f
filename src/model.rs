use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Application identifier used as the config key prefix.
pub const APP_ID: &str = "tours";

/// Selector matched to detect another running tour overlay.
pub const OVERLAY_SELECTOR: &str = "div.tour-overlay";
/// Mount point the tooltip renderer writes into. One fresh node per step.
pub const MOUNT_SELECTOR: &str = "#tour-tooltip";
pub const MOUNT_MARKER: &str = "<div id=\"tour-tooltip\"></div>";

/// Overlays that block a tour from starting at all.
pub const BLOCKING_SELECTORS: &[&str] = &["#firstrunwizard", "#terms_of_service_content"];

pub const ASIDE_TAG: &str = "aside";
pub const ASIDE_PANEL_CLASS: &str = "app-sidebar";
pub const ACTIVE_TAB_CLASS: &str = "app-sidebar__tab--active";

/// Tours don't start below this viewport (lack of readability).
pub const MIN_VIEWPORT: (u32, u32) = (800, 500);

/// Wait a bit after page load for all content to settle.
pub const BOOT_SETTLE: Duration = Duration::from_millis(100);
/// Pause between flagging an opener and clicking it, so the shine is seen.
pub const PRECLICK_DELAY: Duration = Duration::from_millis(100);
/// Bounded wait for the DOM to settle after a simulated click.
pub const CLICK_SETTLE_TIMEOUT: Duration = Duration::from_millis(400);
/// Bounded wait for the tooltip mount point to appear.
pub const MOUNT_TIMEOUT: Duration = Duration::from_millis(400);
pub const SHINE_LIFETIME: Duration = Duration::from_millis(1000);
/// Delay between an aside panel/tab appearing and the tour starting.
pub const ASIDE_SETTLE: Duration = Duration::from_millis(1000);
/// Delay before resuming a continued tour after a route change.
pub const RESUME_DELAY: Duration = Duration::from_millis(200);
/// One-shot re-check after start, covering automatic redirections that
/// never surface as a navigation event.
pub const NAV_RECHECK_DELAY: Duration = Duration::from_millis(1000);

pub const DEFAULT_POSITION: &str = "bottom";
pub const FLOATING_POSITION: &str = "floating";

/// Per-user "never show this tour again" flag key.
pub fn dismiss_key(tour_id: &str) -> String {
    format!("{}-dontShowAgain-{}", APP_ID, tour_id)
}

/// Cross-navigation continuation token key, stored through the same gateway.
pub fn continue_key(tour_id: &str) -> String {
    format!("{}-continueOn-{}", APP_ID, tour_id)
}

/// What the host page hands over on load.
#[derive(Debug, Clone, Deserialize)]
pub struct BootInfo {
    pub app_name: String,
    pub app_version: String,
    pub server_version: String,
}

/// Versions a `specialForVersions` override is matched against.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionContext {
    pub server_version: String,
    pub app_version: String,
}

/// One tour as it appears in a merged document.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTour {
    pub name: Option<String>,
    #[serde(default)]
    pub steps: Vec<RawStep>,
}

/// One step of a merged tour document. Extra keys (e.g. the copied
/// `specialForVersions` block) are tolerated and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStep {
    pub element: Option<String>,
    #[serde(default)]
    pub hover: bool,
    pub open: Option<String>,
    pub position: Option<String>,
    #[serde(default)]
    pub paragraphs: Vec<String>,
    pub img: Option<String>,
    pub links: Option<Vec<String>>,
    pub choices: Option<Value>,
}

/// A related-tour link with its display name resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourLink {
    pub link_id: String,
    pub link_name: String,
}

/// Everything the tooltip renderer needs for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TooltipPayload {
    pub paragraphs: Vec<String>,
    pub img: Option<String>,
    pub button: bool,
    pub links: Option<Vec<TourLink>>,
    pub choices: Option<Value>,
}
