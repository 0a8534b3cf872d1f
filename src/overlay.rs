use crate::dom::PageHost;
use crate::model::{MOUNT_MARKER, SHINE_LIFETIME};
use std::sync::{Arc, Mutex};

/// The overlay, highlight and tooltip chrome of one running tour.
///
/// Everything happens through `PageHost` operations on our own nodes; the
/// frame never reaches into presentation internals. The tooltip container is
/// re-filled on every step, so a fresh mount node is inserted each time and
/// the engine's mount watcher sees it appear.
#[derive(Clone)]
pub struct OverlayFrame {
    page: Arc<dyn PageHost>,
    nodes: Arc<Mutex<Option<FrameNodes>>>,
}

#[derive(Clone, Copy)]
struct FrameNodes {
    overlay: u64,
    floating: u64,
    highlight: u64,
    tooltip: u64,
}

impl OverlayFrame {
    pub fn new(page: Arc<dyn PageHost>) -> Self {
        OverlayFrame {
            page,
            nodes: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.nodes.lock().unwrap().is_some()
    }

    /// Inserts the overlay chrome. No-op when already shown.
    pub async fn start(&self) {
        if self.is_active() {
            return;
        }
        let overlay = self.page.insert_html("body", "<div class=\"tour-overlay\"></div>").await;
        let floating = self.page.insert_html("body", "<div class=\"tour-floating\"></div>").await;
        let highlight = self.page.insert_html("body", "<div class=\"tour-highlight\"></div>").await;
        let tooltip = self.page.insert_html("body", "<div class=\"tour-tooltipframe\"></div>").await;

        if let (Some(overlay), Some(floating), Some(highlight), Some(tooltip)) =
            (overlay, floating, highlight, tooltip)
        {
            *self.nodes.lock().unwrap() = Some(FrameNodes {
                overlay,
                floating,
                highlight,
                tooltip,
            });
        } else {
            log::error!("page has no body to mount the tour overlay on");
        }
    }

    /// Points the highlight at a step's target and re-mounts the tooltip.
    pub async fn show_step(&self, target: Option<u64>, position: &str) {
        let Some(nodes) = self.frame() else { return };
        self.point_highlight(nodes, target, position).await;
        self.page
            .set_inner_html(
                nodes.tooltip,
                &format!("<div class=\"tour-tooltiptext\">{}</div>", MOUNT_MARKER),
            )
            .await;
    }

    /// Re-points the highlight without touching the tooltip, used when a
    /// gated step's target resolves while its tooltip is already up.
    pub async fn refresh(&self, target: Option<u64>, position: &str) {
        let Some(nodes) = self.frame() else { return };
        self.point_highlight(nodes, target, position).await;
    }

    /// Drops a quickly-fading marker on an element about to be clicked.
    pub async fn shine(&self, target: u64) {
        self.page
            .insert_html("body", &format!("<div class=\"shine\" data-target=\"{}\"></div>", target))
            .await;
        let page = self.page.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SHINE_LIFETIME).await;
            if let Some(node) = page.query("div.shine").await {
                page.remove(node).await;
            }
        });
    }

    pub async fn exit(&self) {
        let taken = self.nodes.lock().unwrap().take();
        if let Some(nodes) = taken {
            for node in [nodes.tooltip, nodes.highlight, nodes.floating, nodes.overlay] {
                self.page.remove(node).await;
            }
        }
    }

    fn frame(&self) -> Option<FrameNodes> {
        *self.nodes.lock().unwrap()
    }

    async fn point_highlight(&self, nodes: FrameNodes, target: Option<u64>, position: &str) {
        // Geometry is the presentation layer's business; the frame only
        // records what to point at.
        let marker = match target {
            Some(id) => format!(
                "<div class=\"tour-target\" data-target=\"{}\" data-position=\"{}\"></div>",
                id, position
            ),
            None => format!("<div class=\"tour-target\" data-position=\"{}\"></div>", position),
        };
        self.page.set_inner_html(nodes.highlight, &marker).await;
    }
}
