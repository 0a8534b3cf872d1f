use crate::actors::engine::{IsActive, RunTour, StopTour, TourActor};
use crate::dom::{PageEvent, PageHost};
use crate::model::{ACTIVE_TAB_CLASS, ASIDE_PANEL_CLASS, ASIDE_SETTLE, ASIDE_TAG};
use actix::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static TAB_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.*-aside-(.+)$").unwrap());

/// Tab a sidebar tour is scoped to, taken from its id. A plain `*-aside`
/// id is scoped to the whole panel.
pub fn aside_tab(tour_id: &str) -> Option<String> {
    TAB_SUFFIX
        .captures(tour_id)
        .map(|captures| captures[1].to_string())
}

/// Supervises one sidebar-scoped tour.
///
/// The sidebar opens and closes as the user works, so the tour can't just
/// start at boot. This actor arms itself when the panel is on screen (or
/// appears later), waits for the panel to settle, and starts the engine.
/// Closing the panel, or leaving the scoped tab, stops the tour silently so
/// it can come back with the panel.
pub struct AsideActor {
    engine: Addr<TourActor>,
    page: Arc<dyn PageHost>,
    tab_name: Option<String>,
    armed: bool,
}

impl AsideActor {
    pub fn new(tour_id: &str, engine: Addr<TourActor>, page: Arc<dyn PageHost>) -> Self {
        AsideActor {
            engine,
            page,
            tab_name: aside_tab(tour_id),
            armed: false,
        }
    }

    fn arm(&mut self, ctx: &mut Context<Self>) {
        self.armed = true;
        ctx.run_later(ASIDE_SETTLE, |_act, ctx| ctx.notify(TryStart));
    }

    fn disarm(&mut self) {
        self.armed = false;
        let engine = self.engine.clone();
        actix::spawn(async move {
            match engine.send(IsActive).await {
                Ok(true) => engine.do_send(StopTour { silent: true }),
                Ok(false) => {}
                Err(e) => log::warn!("engine unreachable: {}", e),
            }
        });
    }
}

impl Actor for AsideActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let addr = ctx.address();
        let mut events = self.page.subscribe();
        actix::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if !addr.connected() {
                            break;
                        }
                        addr.do_send(PanelEvent(event));
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

/// Entry point: watch for the panel, start when it settles.
#[derive(Message)]
#[rtype(result = "()")]
pub struct RunAside;

#[derive(Message)]
#[rtype(result = "()")]
struct PanelEvent(PageEvent);

#[derive(Message)]
#[rtype(result = "()")]
struct TryStart;

impl Handler<RunAside> for AsideActor {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, _msg: RunAside, _ctx: &mut Self::Context) -> Self::Result {
        let page = self.page.clone();
        Box::pin(
            async move { page.query(ASIDE_TAG).await.is_some() }
                .into_actor(self)
                .map(|present, act, ctx| {
                    if present {
                        act.arm(ctx);
                    }
                    // Otherwise stay dormant until the panel shows up.
                }),
        )
    }
}

impl Handler<PanelEvent> for AsideActor {
    type Result = ();

    fn handle(&mut self, msg: PanelEvent, ctx: &mut Self::Context) {
        match msg.0 {
            PageEvent::NodeAdded { classes, .. } if classes.iter().any(|c| c == ASIDE_PANEL_CLASS) => {
                self.arm(ctx);
            }
            PageEvent::NodeRemoved { classes, .. }
                if classes.iter().any(|c| c == ASIDE_PANEL_CLASS) =>
            {
                self.disarm();
            }
            PageEvent::ClassChanged { html_id, classes, .. } => {
                let watched = match (&self.tab_name, &html_id) {
                    (Some(tab), Some(id)) => tab == id,
                    _ => false,
                };
                if !watched {
                    return;
                }
                if classes.iter().any(|c| c == ACTIVE_TAB_CLASS) {
                    self.arm(ctx);
                } else {
                    self.disarm();
                }
            }
            _ => {}
        }
    }
}

impl Handler<TryStart> for AsideActor {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, _msg: TryStart, _ctx: &mut Self::Context) -> Self::Result {
        if !self.armed {
            return Box::pin(actix::fut::ready(()));
        }

        let page = self.page.clone();
        let engine = self.engine.clone();
        let tab_name = self.tab_name.clone();

        Box::pin(
            async move {
                // A tab-scoped tour only plays while its tab is the active one.
                if let Some(tab) = tab_name {
                    let selector = format!("#{}.{}", tab, ACTIVE_TAB_CLASS);
                    if page.query(&selector).await.is_none() {
                        return;
                    }
                }
                match engine.send(RunTour { compute_options: true }).await {
                    Ok(started) => {
                        if !started {
                            log::debug!("sidebar tour declined to start");
                        }
                    }
                    Err(e) => log::warn!("engine unreachable: {}", e),
                }
            }
            .into_actor(self)
            .map(|_, _, _| ()),
        )
    }
}
