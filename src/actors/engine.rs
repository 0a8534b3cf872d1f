use crate::compile::{compile, CompiledTour, ResolveMode};
use crate::dom::{wait_for_selector, PageHost};
use crate::gateway::{ConfigGateway, MemoryGateway};
use crate::model::{
    continue_key, dismiss_key, BLOCKING_SELECTORS, CLICK_SETTLE_TIMEOUT, DEFAULT_POSITION,
    FLOATING_POSITION, MOUNT_SELECTOR, MOUNT_TIMEOUT, OVERLAY_SELECTOR, PRECLICK_DELAY,
};
use crate::overlay::OverlayFrame;
use crate::present::{Notifier, TooltipContext, TooltipRenderer};
use crate::routes::{filter_for_route, Route, RoutePlan};
use actix::prelude::*;
use serde_json::{Map, Value};
use std::sync::Arc;

const MSG_NOT_AGAIN: &str = "Saved. This tutorial won't be shown again.";
const MSG_PLAY_AGAIN: &str = "Saved. This tutorial will play again next time.";
const MSG_READ_FAILED: &str = "Could not read your tutorial preferences.";

/// Whether and how a tour is cut down to the current page.
pub enum RouteFilter {
    None,
    ByRoute(RoutePlan),
}

/// What happens to the outside world when a tour ends.
pub enum ExitPolicy {
    /// Persist dismissal per user through the config gateway.
    Persist,
    /// Persist, and when the primary leg finishes, store a continuation
    /// token and send the page to the secondary route.
    RedirectAndContinue(RoutePlan),
    /// No persistence. The callback fires once, when the final step is
    /// completed (ad-hoc tours).
    Complete(Option<Box<dyn FnOnce() + Send>>),
}

/// Everything a tour engine is wired up with.
pub struct EngineConfig {
    pub tour_id: String,
    pub app_id: String,
    pub app_name: String,
    pub doc: Map<String, Value>,
    pub page: Arc<dyn PageHost>,
    pub gateway: Arc<dyn ConfigGateway>,
    pub renderer: Arc<dyn TooltipRenderer>,
    pub notifier: Arc<dyn Notifier>,
    pub route_filter: RouteFilter,
    pub exit_policy: ExitPolicy,
}

/// One tour's state machine. All transitions run through this actor's
/// mailbox, and each step transition is waited on before the next message
/// is taken, so transitions never interleave.
pub struct TourActor {
    tour_id: String,
    app_id: String,
    app_name: String,
    doc: Map<String, Value>,
    program: Option<CompiledTour>,
    page: Arc<dyn PageHost>,
    gateway: Arc<dyn ConfigGateway>,
    renderer: Arc<dyn TooltipRenderer>,
    notifier: Arc<dyn Notifier>,
    route_filter: RouteFilter,
    exit_policy: ExitPolicy,
    overlay: OverlayFrame,
    active: bool,
    current_step: usize,
    /// Element revealed for the current hover step, restored on leave.
    last_hovered: Option<u64>,
}

impl TourActor {
    pub fn new(config: EngineConfig) -> Self {
        let overlay = OverlayFrame::new(config.page.clone());
        TourActor {
            tour_id: config.tour_id,
            app_id: config.app_id,
            app_name: config.app_name,
            doc: config.doc,
            program: None,
            page: config.page,
            gateway: config.gateway,
            renderer: config.renderer,
            notifier: config.notifier,
            route_filter: config.route_filter,
            exit_policy: config.exit_policy,
            overlay,
            active: false,
            current_step: 0,
            last_hovered: None,
        }
    }
}

impl Actor for TourActor {
    type Context = Context<Self>;
}

/// Starts the tour if nothing blocks it. Resolves to whether it started.
#[derive(Message)]
#[rtype(result = "bool")]
pub struct RunTour {
    /// Recompile the step program from the document before starting.
    pub compute_options: bool,
}

/// Tears the tour down. A silent stop skips all persistence, used when a
/// supervisor stops a tour that will come back (tab switch, navigation).
#[derive(Message)]
#[rtype(result = "()")]
pub struct StopTour {
    pub silent: bool,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Advance;

#[derive(Message)]
#[rtype(result = "()")]
pub struct Retreat;

#[derive(Message)]
#[rtype(result = "()")]
pub struct ExitRequested;

/// Swap in a freshly loaded document. Invalidates the compiled program.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ReplaceDoc(pub Map<String, Value>);

#[derive(Message)]
#[rtype(result = "bool")]
pub struct IsActive;

/// Navigation requests coming back from the rendered tooltip.
#[derive(Message)]
#[rtype(result = "()")]
pub enum TourCommand {
    Next,
    Prev,
    Exit,
}

#[derive(Message)]
#[rtype(result = "()")]
struct ShowStep(usize);

#[derive(Clone, Copy)]
enum ExitKind {
    /// User left before the final step.
    Early,
    /// The final step was completed or exited.
    Final,
    /// Supervisor stop, nothing is persisted.
    Silent,
}

impl Handler<RunTour> for TourActor {
    type Result = ResponseActFuture<Self, bool>;

    fn handle(&mut self, msg: RunTour, _ctx: &mut Self::Context) -> Self::Result {
        if self.active {
            return Box::pin(actix::fut::ready(false));
        }

        let page = self.page.clone();
        let gateway = self.gateway.clone();
        let dismiss = dismiss_key(&self.tour_id);

        Box::pin(
            async move {
                if page.query(OVERLAY_SELECTOR).await.is_some() {
                    log::debug!("another tour is already on screen");
                    return None;
                }
                for selector in BLOCKING_SELECTORS {
                    if let Some(node) = page.query(selector).await {
                        if page.is_visible(node).await {
                            log::debug!("blocked by {}", selector);
                            return None;
                        }
                    }
                }
                match gateway.get(&dismiss).await {
                    Ok(flag) if flag == "true" => return None,
                    Ok(_) => {}
                    Err(e) => log::warn!("could not read dismissal flag {}: {}", dismiss, e),
                }
                Some(page.location().await)
            }
            .into_actor(self)
            .map(move |location, act, ctx| {
                let Some(location) = location else {
                    return false;
                };

                if msg.compute_options || act.program.is_none() {
                    match compile(&act.tour_id, &act.doc) {
                        Ok(program) => act.program = Some(program),
                        Err(e) => {
                            log::error!("tour '{}' failed to compile: {}", act.tour_id, e);
                            return false;
                        }
                    }
                }

                if let RouteFilter::ByRoute(plan) = &act.route_filter {
                    let route = plan.classify(&location);
                    let program = act.program.take().unwrap();
                    act.program = Some(filter_for_route(program, route));
                }

                if act.program.as_ref().map(CompiledTour::step_count).unwrap_or(0) == 0 {
                    return false;
                }

                act.active = true;
                ctx.notify(ShowStep(0));
                true
            }),
        )
    }
}

impl Handler<ShowStep> for TourActor {
    type Result = ();

    fn handle(&mut self, msg: ShowStep, ctx: &mut Self::Context) {
        if !self.active {
            return;
        }
        let Some(program) = &self.program else { return };
        if msg.0 >= program.step_count() {
            return;
        }
        self.current_step = msg.0;

        let step = program.steps[msg.0].clone();
        let payload = program.payloads[msg.0].clone();
        let hover_selectors = program.hover_selectors.clone();
        let tooltip_ctx = TooltipContext {
            app_id: self.app_id.clone(),
            app_name: program.app_name.clone().unwrap_or_else(|| self.app_name.clone()),
            engine: ctx.address().recipient(),
            step_index: msg.0,
            step_count: program.step_count(),
        };

        let page = self.page.clone();
        let overlay = self.overlay.clone();
        let renderer = self.renderer.clone();
        let restore = self.last_hovered.take();

        // ctx.wait keeps the mailbox closed until the transition lands, so a
        // quick next/prev burst can't interleave two transitions.
        ctx.wait(
            async move {
                overlay.start().await;
                if let Some(node) = restore {
                    page.set_display(node, "").await;
                }

                let (resolved, position) = match &step.mode {
                    ResolveMode::Floating => (None, FLOATING_POSITION.to_string()),
                    ResolveMode::Lazy { selector, position } => match page.query(selector).await {
                        Some(node) => (Some(node), pick_position(position.as_deref())),
                        // A stale handle beats no handle; a step that never
                        // resolved floats.
                        None => match step.resolved {
                            Some(previous) => (Some(previous), pick_position(position.as_deref())),
                            None => (None, FLOATING_POSITION.to_string()),
                        },
                    },
                    ResolveMode::Gated { opener, target } => {
                        match resolve_gated(&page, &overlay, opener, target.as_deref()).await {
                            Some(node) => (Some(node), pick_position(step.position.as_deref())),
                            None => (None, FLOATING_POSITION.to_string()),
                        }
                    }
                };

                // Hover reveal applies however the target resolved.
                let mut hovered = None;
                if let (Some(selector), Some(node)) = (target_selector(&step.mode), resolved) {
                    if hover_selectors.iter().any(|s| s == selector)
                        && !page.is_visible(node).await
                    {
                        page.set_display(node, "block").await;
                        hovered = Some(node);
                    }
                }

                overlay.show_step(resolved, &position).await;

                let mount = match page.query(MOUNT_SELECTOR).await {
                    Some(mount) => Some(mount),
                    None => wait_for_selector(&page, MOUNT_SELECTOR, MOUNT_TIMEOUT).await,
                };
                match mount {
                    Some(mount) => renderer.render(mount, &payload, &tooltip_ctx).await,
                    None => log::error!("tooltip mount point never appeared"),
                }

                (resolved, hovered)
            }
            .into_actor(self)
            .map(move |(resolved, hovered), act, _ctx| {
                if let Some(program) = &mut act.program {
                    if let Some(step) = program.steps.get_mut(msg.0) {
                        step.resolved = resolved;
                    }
                }
                act.last_hovered = hovered;
            }),
        );
    }
}

fn pick_position(position: Option<&str>) -> String {
    position.unwrap_or(DEFAULT_POSITION).to_string()
}

/// The element a step is about, regardless of how it gets resolved.
fn target_selector(mode: &ResolveMode) -> Option<&str> {
    match mode {
        ResolveMode::Lazy { selector, .. } => Some(selector),
        ResolveMode::Gated { target: Some(target), .. } => Some(target),
        _ => None,
    }
}

/// Resolves a gated step's target. If a previous visit already revealed the
/// target, it is reused without re-clicking the opener. Otherwise the opener
/// is shone, clicked after a beat, and the target awaited with a bounded
/// timeout. A step with no target of its own highlights the opener.
async fn resolve_gated(
    page: &Arc<dyn PageHost>,
    overlay: &OverlayFrame,
    opener: &str,
    target: Option<&str>,
) -> Option<u64> {
    if let Some(selector) = target {
        if let Some(node) = page.query(selector).await {
            if page.is_visible(node).await {
                return Some(node);
            }
        }
    }

    let opener_node = page.query(opener).await?;
    overlay.shine(opener_node).await;
    tokio::time::sleep(PRECLICK_DELAY).await;
    page.click(opener_node).await;

    match target {
        Some(selector) => wait_for_selector(page, selector, CLICK_SETTLE_TIMEOUT).await,
        None => Some(opener_node),
    }
}

impl TourActor {
    fn finish(&mut self, ctx: &mut Context<Self>, kind: ExitKind) {
        if !self.active {
            return;
        }
        self.active = false;

        let completion = match (&kind, &mut self.exit_policy) {
            (ExitKind::Final, ExitPolicy::Complete(callback)) => callback.take(),
            _ => None,
        };
        let plan = match &self.exit_policy {
            ExitPolicy::RedirectAndContinue(plan) => Some(plan.clone()),
            _ => None,
        };
        let persist = matches!(
            self.exit_policy,
            ExitPolicy::Persist | ExitPolicy::RedirectAndContinue(_)
        );

        let page = self.page.clone();
        let overlay = self.overlay.clone();
        let gateway = self.gateway.clone();
        let notifier = self.notifier.clone();
        let tour_id = self.tour_id.clone();
        let restore = self.last_hovered.take();

        ctx.wait(
            async move {
                if let Some(node) = restore {
                    page.set_display(node, "").await;
                }
                overlay.exit().await;

                if let Some(callback) = completion {
                    callback();
                }
                if matches!(kind, ExitKind::Silent) || !persist {
                    return;
                }

                if let Some(plan) = plan {
                    let location = page.location().await;
                    match plan.classify(&location) {
                        Route::Primary if matches!(kind, ExitKind::Final) => {
                            // Arm the continuation and carry the user over.
                            // Without the token a redirect would strand them,
                            // so a failed write cancels the redirect.
                            match gateway.set(&continue_key(&tour_id), "true").await {
                                Ok(()) => page.navigate(&plan.secondary_url(&location)).await,
                                Err(e) => log::warn!(
                                    "could not arm continuation for '{}': {}",
                                    tour_id,
                                    e
                                ),
                            }
                            return;
                        }
                        _ => {
                            if let Err(e) = gateway.set(&continue_key(&tour_id), "").await {
                                log::warn!("could not clear continuation for '{}': {}", tour_id, e);
                            }
                        }
                    }
                }

                match kind {
                    ExitKind::Early => {
                        // Best effort, a lost write just means the tour plays
                        // again next visit.
                        if let Err(e) = gateway.set(&dismiss_key(&tour_id), "true").await {
                            log::warn!("could not persist dismissal for '{}': {}", tour_id, e);
                        }
                    }
                    ExitKind::Final => {
                        // Finishing only reports the stored choice; the flag
                        // is written through the tooltip's run-again button,
                        // never here.
                        let key = dismiss_key(&tour_id);
                        match gateway.get(&key).await {
                            Ok(current) => {
                                let notice = if current == "true" {
                                    MSG_NOT_AGAIN
                                } else {
                                    MSG_PLAY_AGAIN
                                };
                                notifier.success(notice);
                            }
                            Err(e) => {
                                log::warn!("could not read '{}': {}", key, e);
                                notifier.error(MSG_READ_FAILED);
                            }
                        }
                    }
                    ExitKind::Silent => {}
                }
            }
            .into_actor(self)
            .map(|_, _, _| ()),
        );
    }
}

impl Handler<Advance> for TourActor {
    type Result = ();

    fn handle(&mut self, _msg: Advance, ctx: &mut Self::Context) {
        if !self.active {
            return;
        }
        let last = self.program.as_ref().map(CompiledTour::last_step).unwrap_or(0);
        if self.current_step >= last {
            self.finish(ctx, ExitKind::Final);
        } else {
            ctx.notify(ShowStep(self.current_step + 1));
        }
    }
}

impl Handler<Retreat> for TourActor {
    type Result = ();

    fn handle(&mut self, _msg: Retreat, ctx: &mut Self::Context) {
        if !self.active || self.current_step == 0 {
            return;
        }
        ctx.notify(ShowStep(self.current_step - 1));
    }
}

impl Handler<ExitRequested> for TourActor {
    type Result = ();

    fn handle(&mut self, _msg: ExitRequested, ctx: &mut Self::Context) {
        if !self.active {
            return;
        }
        let last = self.program.as_ref().map(CompiledTour::last_step).unwrap_or(0);
        let kind = if self.current_step >= last {
            ExitKind::Final
        } else {
            ExitKind::Early
        };
        self.finish(ctx, kind);
    }
}

impl Handler<StopTour> for TourActor {
    type Result = ();

    fn handle(&mut self, msg: StopTour, ctx: &mut Self::Context) {
        let kind = if msg.silent { ExitKind::Silent } else { ExitKind::Early };
        self.finish(ctx, kind);
    }
}

impl Handler<TourCommand> for TourActor {
    type Result = ();

    fn handle(&mut self, msg: TourCommand, ctx: &mut Self::Context) {
        match msg {
            TourCommand::Next => ctx.notify(Advance),
            TourCommand::Prev => ctx.notify(Retreat),
            TourCommand::Exit => ctx.notify(ExitRequested),
        }
    }
}

impl Handler<ReplaceDoc> for TourActor {
    type Result = ();

    fn handle(&mut self, msg: ReplaceDoc, _ctx: &mut Self::Context) {
        self.doc = msg.0;
        self.program = None;
    }
}

impl Handler<IsActive> for TourActor {
    type Result = bool;

    fn handle(&mut self, _msg: IsActive, _ctx: &mut Self::Context) -> bool {
        self.active
    }
}

/// A tour defined in code rather than in the tour documents.
pub struct AdHocTour {
    pub tour_id: String,
    pub title: String,
    pub steps: Vec<Value>,
    pub should_start: bool,
    pub on_complete: Option<Box<dyn FnOnce() + Send>>,
}

/// Spawns an engine for an ad-hoc tour and starts it. Nothing is persisted;
/// `on_complete` fires when the user finishes the final step.
pub fn run_if_wanted(
    page: Arc<dyn PageHost>,
    renderer: Arc<dyn TooltipRenderer>,
    notifier: Arc<dyn Notifier>,
    tour: AdHocTour,
) -> Option<Addr<TourActor>> {
    if !tour.should_start {
        return None;
    }

    let mut doc = Map::new();
    doc.insert(
        tour.tour_id.clone(),
        serde_json::json!({ "name": tour.title, "steps": tour.steps }),
    );

    let engine = TourActor::new(EngineConfig {
        tour_id: tour.tour_id,
        app_id: "adhoc".to_string(),
        app_name: tour.title,
        doc,
        page,
        gateway: Arc::new(MemoryGateway::new()),
        renderer,
        notifier,
        route_filter: RouteFilter::None,
        exit_policy: ExitPolicy::Complete(tour.on_complete),
    })
    .start();

    engine.do_send(RunTour { compute_options: true });
    Some(engine)
}
