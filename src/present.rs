use crate::actors::engine::TourCommand;
use crate::dom::PageHost;
use crate::model::TooltipPayload;
use actix::Recipient;
use async_trait::async_trait;
use std::sync::Arc;

/// What a tooltip needs to know besides its payload.
#[derive(Clone)]
pub struct TooltipContext {
    pub app_id: String,
    pub app_name: String,
    /// Where next/prev/exit requests go. The renderer never mutates engine
    /// state itself.
    pub engine: Recipient<TourCommand>,
    pub step_index: usize,
    pub step_count: usize,
}

/// Renders one step's tooltip into a freshly mounted node.
#[async_trait]
pub trait TooltipRenderer: Send + Sync {
    async fn render(&self, mount: u64, payload: &TooltipPayload, ctx: &TooltipContext);
}

/// Channel for end-of-tour notices shown to the user.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        log::info!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}

/// Default renderer: fills the mount node with the step's markup. Buttons
/// carry data attributes the host page wires to `TourCommand` sends.
pub struct HtmlTooltipRenderer {
    page: Arc<dyn PageHost>,
}

impl HtmlTooltipRenderer {
    pub fn new(page: Arc<dyn PageHost>) -> Self {
        HtmlTooltipRenderer { page }
    }

    fn body_html(payload: &TooltipPayload, ctx: &TooltipContext) -> String {
        let mut html = String::new();

        html.push_str(&format!(
            "<header class=\"tour-tooltip__title\">{}</header>",
            escape(&ctx.app_name)
        ));

        if let Some(img) = &payload.img {
            html.push_str(&format!("<img class=\"tour-tooltip__img\" src=\"{}\">", escape(img)));
        }

        for paragraph in &payload.paragraphs {
            html.push_str(&format!("<p>{}</p>", paragraph));
        }

        if let Some(links) = &payload.links {
            html.push_str("<ul class=\"tour-tooltip__links\">");
            for link in links {
                html.push_str(&format!(
                    "<li><a data-tour-link=\"{}\">{}</a></li>",
                    escape(&link.link_id),
                    escape(&link.link_name)
                ));
            }
            html.push_str("</ul>");
        }

        if let Some(choices) = &payload.choices {
            html.push_str(&format!(
                "<div class=\"tour-tooltip__choices\" data-choices='{}'></div>",
                choices
            ));
        }

        if payload.button {
            html.push_str("<button class=\"tour-tooltip__again\" data-tour-action=\"exit\">Run again next time</button>");
        }

        html.push_str(&format!(
            "<footer class=\"tour-tooltip__nav\" data-step=\"{}\" data-count=\"{}\">\
             <button data-tour-action=\"prev\">&laquo;</button>\
             <button data-tour-action=\"exit\">&times;</button>\
             <button data-tour-action=\"next\">&raquo;</button>\
             </footer>",
            ctx.step_index + 1,
            ctx.step_count
        ));

        html
    }
}

#[async_trait]
impl TooltipRenderer for HtmlTooltipRenderer {
    async fn render(&self, mount: u64, payload: &TooltipPayload, ctx: &TooltipContext) {
        let html = Self::body_html(payload, ctx);
        self.page.set_inner_html(mount, &html).await;
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
