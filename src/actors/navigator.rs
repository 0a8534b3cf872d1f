use crate::actors::engine::{IsActive, ReplaceDoc, RunTour, StopTour, TourActor};
use crate::content::{load_merged, ContentSource};
use crate::dom::{PageEvent, PageHost};
use crate::gateway::ConfigGateway;
use crate::model::{continue_key, VersionContext, NAV_RECHECK_DELAY, RESUME_DELAY};
use crate::routes::{Route, RoutePlan};
use actix::prelude::*;
use std::sync::Arc;

/// Supervises one split tour across navigations.
///
/// The engine ends the primary leg by arming a continuation token and
/// redirecting; this actor notices the arrival on the secondary route,
/// reloads the document and restarts the engine there. It also stops a
/// running tour silently when the user changes route mid-step (same-route
/// URL tweaks are ignored), and fires
/// one delayed re-check after boot for redirections that never surface as a
/// navigation event.
pub struct NavigatorActor {
    engine: Addr<TourActor>,
    page: Arc<dyn PageHost>,
    gateway: Arc<dyn ConfigGateway>,
    source: Arc<dyn ContentSource>,
    tour_id: String,
    user_language: String,
    versions: VersionContext,
    plan: RoutePlan,
    /// Route the current location classified as when last looked at.
    last_route: Option<Route>,
}

impl NavigatorActor {
    pub fn new(
        engine: Addr<TourActor>,
        page: Arc<dyn PageHost>,
        gateway: Arc<dyn ConfigGateway>,
        source: Arc<dyn ContentSource>,
        tour_id: String,
        user_language: String,
        versions: VersionContext,
        plan: RoutePlan,
    ) -> Self {
        NavigatorActor {
            engine,
            page,
            gateway,
            source,
            tour_id,
            user_language,
            versions,
            plan,
            last_route: None,
        }
    }
}

impl Actor for NavigatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let addr = ctx.address();
        let mut events = self.page.subscribe();
        actix::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PageEvent::UrlChanged { url }) => {
                        if !addr.connected() {
                            break;
                        }
                        addr.do_send(UrlSeen(url));
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Classify the starting location before any event is handled, so
        // only actual route changes register as changes.
        let page = self.page.clone();
        ctx.wait(
            async move { page.location().await }
                .into_actor(self)
                .map(|location, act, _ctx| {
                    act.last_route = Some(act.plan.classify(&location));
                }),
        );

        ctx.run_later(NAV_RECHECK_DELAY, |_act, ctx| {
            ctx.notify(CheckRoute);
        });
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct UrlSeen(String);

/// One-shot route re-check, scheduled a moment after startup.
#[derive(Message)]
#[rtype(result = "()")]
struct CheckRoute;

#[derive(Message)]
#[rtype(result = "()")]
struct Resume;

impl Handler<UrlSeen> for NavigatorActor {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, msg: UrlSeen, _ctx: &mut Self::Context) -> Self::Result {
        let route = self.plan.classify(&msg.0);
        if self.last_route == Some(route) {
            // Same-route tweaks (anchors, query strings) leave the tour alone.
            return Box::pin(actix::fut::ready(()));
        }
        self.last_route = Some(route);

        let engine = self.engine.clone();
        Box::pin(
            async move {
                // A route change pulls the ground out from under the running
                // leg; its targets are gone.
                match engine.send(IsActive).await {
                    Ok(true) => engine.do_send(StopTour { silent: true }),
                    Ok(false) => {}
                    Err(e) => log::warn!("engine unreachable: {}", e),
                }
            }
            .into_actor(self)
            .map(move |_, _act, ctx| {
                if route == Route::Secondary {
                    ctx.run_later(RESUME_DELAY, |_act, ctx| ctx.notify(Resume));
                }
            }),
        )
    }
}

impl Handler<CheckRoute> for NavigatorActor {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, _msg: CheckRoute, _ctx: &mut Self::Context) -> Self::Result {
        let page = self.page.clone();
        Box::pin(
            async move { page.location().await }
                .into_actor(self)
                .map(|location, act, ctx| {
                    let route = act.plan.classify(&location);
                    act.last_route = Some(route);
                    if route == Route::Secondary {
                        ctx.notify(Resume);
                    }
                }),
        )
    }
}

impl Handler<Resume> for NavigatorActor {
    type Result = ResponseFuture<()>;

    fn handle(&mut self, _msg: Resume, _ctx: &mut Self::Context) -> Self::Result {
        let engine = self.engine.clone();
        let gateway = self.gateway.clone();
        let source = self.source.clone();
        let token = continue_key(&self.tour_id);
        let user_language = self.user_language.clone();
        let versions = self.versions.clone();
        let tour_id = self.tour_id.clone();

        Box::pin(async move {
            match gateway.get(&token).await {
                Ok(flag) if flag == "true" => {}
                Ok(_) => return,
                Err(e) => {
                    log::warn!("could not read continuation token {}: {}", token, e);
                    return;
                }
            }

            // The page changed, the document may have too.
            let doc = match load_merged(source.as_ref(), &user_language, &versions).await {
                Ok(doc) => doc,
                Err(e) => {
                    log::error!("could not reload tour data to resume '{}': {}", tour_id, e);
                    return;
                }
            };

            if let Err(e) = engine.send(ReplaceDoc(doc)).await {
                log::warn!("engine unreachable: {}", e);
                return;
            }
            match engine.send(RunTour { compute_options: true }).await {
                Ok(true) => {
                    // Consumed; a failed clear means one extra resume attempt.
                    if let Err(e) = gateway.set(&token, "").await {
                        log::warn!("could not clear continuation token {}: {}", token, e);
                    }
                }
                Ok(false) => log::debug!("tour '{}' declined to resume", tour_id),
                Err(e) => log::warn!("engine unreachable: {}", e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::engine::{EngineConfig, ExitPolicy, RouteFilter};
    use crate::content::testing::FixedContentSource;
    use crate::dom::page::StaticPage;
    use crate::gateway::MemoryGateway;
    use crate::model::dismiss_key;
    use crate::present::testing::{RecordingNotifier, RecordingRenderer};
    use serde_json::{json, Map, Value};
    use std::time::Duration;

    const PAGE: &str = r#"<html><body><div id="content"></div></body></html>"#;

    fn plan() -> RoutePlan {
        RoutePlan {
            primary_needle: "/apps/files".to_string(),
            secondary_needle: "/settings/user".to_string(),
            secondary_path: "/settings/user".to_string(),
        }
    }

    fn doc() -> Map<String, Value> {
        json!({
            "files": { "name": "Files", "steps": [
                { "paragraphs": ["landing"] },
                { "paragraphs": ["settings one"] },
                { "paragraphs": ["settings two"] }
            ]}
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn versions() -> VersionContext {
        VersionContext {
            server_version: "29".to_string(),
            app_version: "1.0".to_string(),
        }
    }

    struct Fixture {
        page: Arc<StaticPage>,
        gateway: MemoryGateway,
        renderer: Arc<RecordingRenderer>,
        source: Arc<FixedContentSource>,
        engine: Addr<TourActor>,
    }

    impl Fixture {
        fn new(location: &str) -> Self {
            let page = Arc::new(StaticPage::from_html(PAGE, location));
            let gateway = MemoryGateway::new();
            let renderer = Arc::new(RecordingRenderer::default());
            let source = Arc::new(FixedContentSource::new(doc(), Map::new()));
            let engine = TourActor::new(EngineConfig {
                tour_id: "files".to_string(),
                app_id: "files".to_string(),
                app_name: "Files".to_string(),
                doc: doc(),
                page: page.clone(),
                gateway: Arc::new(gateway.clone()),
                renderer: renderer.clone(),
                notifier: Arc::new(RecordingNotifier::default()),
                route_filter: RouteFilter::ByRoute(plan()),
                exit_policy: ExitPolicy::RedirectAndContinue(plan()),
            })
            .start();
            Fixture {
                page,
                gateway,
                renderer,
                source,
                engine,
            }
        }

        fn navigator(&self) -> Addr<NavigatorActor> {
            NavigatorActor::new(
                self.engine.clone(),
                self.page.clone(),
                Arc::new(self.gateway.clone()),
                self.source.clone(),
                "files".to_string(),
                "en".to_string(),
                versions(),
                plan(),
            )
            .start()
        }
    }

    #[actix_rt::test]
    async fn test_resumes_on_secondary_after_redirect() {
        let fixture = Fixture::new("/apps/files");
        let _navigator = fixture.navigator();

        assert!(fixture.engine.send(RunTour { compute_options: true }).await.unwrap());
        actix_rt::time::sleep(Duration::from_millis(50)).await;
        // Primary leg shows the landing step only.
        assert_eq!(fixture.renderer.steps(), vec![0]);

        // Finishing the landing step redirects; the navigator picks the
        // arrival up and resumes the remaining steps.
        fixture.engine.send(crate::actors::engine::Advance).await.unwrap();
        actix_rt::time::sleep(RESUME_DELAY + Duration::from_millis(200)).await;

        assert_eq!(fixture.page.location().await, "/settings/user");
        assert!(fixture.engine.send(IsActive).await.unwrap());
        assert_eq!(fixture.renderer.steps(), vec![0, 0]);
        assert_eq!(fixture.gateway.get(&continue_key("files")).await.unwrap(), "");
    }

    #[actix_rt::test]
    async fn test_no_token_means_no_resume() {
        let fixture = Fixture::new("/apps/files");
        let _navigator = fixture.navigator();

        fixture.page.navigate("/settings/user").await;
        actix_rt::time::sleep(RESUME_DELAY + Duration::from_millis(100)).await;

        assert!(!fixture.engine.send(IsActive).await.unwrap());
        assert!(fixture.renderer.steps().is_empty());
    }

    #[actix_rt::test]
    async fn test_mid_tour_navigation_stops_silently() {
        let fixture = Fixture::new("/apps/files");
        let _navigator = fixture.navigator();

        assert!(fixture.engine.send(RunTour { compute_options: true }).await.unwrap());
        actix_rt::time::sleep(Duration::from_millis(50)).await;

        // User wanders off to the other route before finishing the landing
        // step. No continuation token was armed, so nothing resumes.
        fixture.page.navigate("/settings/user").await;
        actix_rt::time::sleep(RESUME_DELAY + Duration::from_millis(100)).await;

        assert!(!fixture.engine.send(IsActive).await.unwrap());
        // Silent stop, so no dismissal was written.
        assert_eq!(fixture.gateway.get(&dismiss_key("files")).await.unwrap(), "");
    }

    #[actix_rt::test]
    async fn test_same_route_navigation_keeps_tour_running() {
        let fixture = Fixture::new("/apps/files");
        let _navigator = fixture.navigator();

        assert!(fixture.engine.send(RunTour { compute_options: true }).await.unwrap());
        actix_rt::time::sleep(Duration::from_millis(50)).await;

        // An anchor tweak classifies as the same route; the tour survives.
        fixture.page.navigate("/apps/files#anchor").await;
        actix_rt::time::sleep(Duration::from_millis(100)).await;

        assert!(fixture.engine.send(IsActive).await.unwrap());
        assert_eq!(fixture.renderer.steps(), vec![0]);
    }

    #[actix_rt::test]
    async fn test_boot_recheck_resumes_after_silent_redirect() {
        let fixture = Fixture::new("/settings/user");
        fixture.gateway.set(&continue_key("files"), "true").await.unwrap();
        let _navigator = fixture.navigator();

        // No navigation event ever fires; the delayed re-check catches it.
        actix_rt::time::sleep(NAV_RECHECK_DELAY + Duration::from_millis(200)).await;

        assert!(fixture.engine.send(IsActive).await.unwrap());
        assert_eq!(fixture.renderer.steps(), vec![0]);
        assert_eq!(fixture.gateway.get(&continue_key("files")).await.unwrap(), "");
    }

    #[actix_rt::test]
    async fn test_resume_survives_reloaded_document() {
        let fixture = Fixture::new("/apps/files");
        let _navigator = fixture.navigator();

        assert!(fixture.engine.send(RunTour { compute_options: true }).await.unwrap());
        actix_rt::time::sleep(Duration::from_millis(50)).await;

        // The document served on the secondary page differs.
        let fresh = json!({
            "files": { "name": "Files", "steps": [
                { "paragraphs": ["landing"] },
                { "paragraphs": ["rewritten"] }
            ]}
        })
        .as_object()
        .unwrap()
        .clone();
        fixture.source.replace_content(fresh);

        fixture.engine.send(crate::actors::engine::Advance).await.unwrap();
        actix_rt::time::sleep(RESUME_DELAY + Duration::from_millis(200)).await;

        let rendered = fixture.renderer.rendered.lock().unwrap().clone();
        assert_eq!(rendered.last().unwrap().1, vec!["rewritten".to_string()]);
    }
}
