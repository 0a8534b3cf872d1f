use crate::actors::aside::{AsideActor, RunAside};
use crate::actors::engine::{EngineConfig, ExitPolicy, RouteFilter, RunTour, TourActor};
use crate::actors::navigator::NavigatorActor;
use crate::config::CONFIG;
use crate::content::{load_merged, ContentSource};
use crate::dom::PageHost;
use crate::errors::UsherError;
use crate::gateway::ConfigGateway;
use crate::model::{BootInfo, VersionContext, BOOT_SETTLE, MIN_VIEWPORT};
use crate::present::{Notifier, TooltipRenderer};
use crate::routes::RoutePlan;
use actix::prelude::*;
use regex::Regex;
use std::sync::Arc;

/// What the host page reports when it comes up.
pub struct BootSpec {
    pub boot: BootInfo,
    pub viewport: (u32, u32),
    pub user_language: String,
    /// Present when the app's tour spans two routes.
    pub route_plan: Option<RoutePlan>,
}

/// Handles to everything `launch` started.
#[derive(Default)]
pub struct Launched {
    pub main: Option<Addr<TourActor>>,
    pub navigator: Option<Addr<NavigatorActor>>,
    pub asides: Vec<Addr<AsideActor>>,
}

/// Boots the tours for one page: loads and merges the documents, starts the
/// app's main tour, and puts a supervisor on every sidebar-scoped tour the
/// document declares for this app.
pub async fn launch(
    page: Arc<dyn PageHost>,
    gateway: Arc<dyn ConfigGateway>,
    source: Arc<dyn ContentSource>,
    renderer: Arc<dyn TooltipRenderer>,
    notifier: Arc<dyn Notifier>,
    spec: BootSpec,
) -> Result<Launched, UsherError> {
    let min_width = CONFIG.min_viewport_width.unwrap_or(MIN_VIEWPORT.0);
    let min_height = CONFIG.min_viewport_height.unwrap_or(MIN_VIEWPORT.1);
    if spec.viewport.0 < min_width || spec.viewport.1 < min_height {
        log::info!(
            "viewport {}x{} too small for tours, staying quiet",
            spec.viewport.0,
            spec.viewport.1
        );
        return Ok(Launched::default());
    }

    let versions = VersionContext {
        server_version: spec.boot.server_version.clone(),
        app_version: spec.boot.app_version.clone(),
    };
    let doc = load_merged(source.as_ref(), &spec.user_language, &versions).await?;

    // Let the page finish its own startup work before poking at it.
    tokio::time::sleep(BOOT_SETTLE).await;

    let app = &spec.boot.app_name;
    let mut launched = Launched::default();

    if doc.contains_key(app) {
        let (route_filter, exit_policy) = match &spec.route_plan {
            Some(plan) => (
                RouteFilter::ByRoute(plan.clone()),
                ExitPolicy::RedirectAndContinue(plan.clone()),
            ),
            None => (RouteFilter::None, ExitPolicy::Persist),
        };
        let engine = TourActor::new(EngineConfig {
            tour_id: app.clone(),
            app_id: app.clone(),
            app_name: app.clone(),
            doc: doc.clone(),
            page: page.clone(),
            gateway: gateway.clone(),
            renderer: renderer.clone(),
            notifier: notifier.clone(),
            route_filter,
            exit_policy,
        })
        .start();

        if let Some(plan) = &spec.route_plan {
            launched.navigator = Some(
                NavigatorActor::new(
                    engine.clone(),
                    page.clone(),
                    gateway.clone(),
                    source.clone(),
                    app.clone(),
                    spec.user_language.clone(),
                    versions.clone(),
                    plan.clone(),
                )
                .start(),
            );
        }

        engine.do_send(RunTour { compute_options: true });
        launched.main = Some(engine);
    } else {
        log::debug!("no tour declared for app '{}'", app);
    }

    let aside_pattern = Regex::new(&format!("^{}-aside(-.+)?$", regex::escape(app)))
        .map_err(|e| UsherError::Document(e.to_string()))?;
    for tour_id in doc.keys().filter(|key| aside_pattern.is_match(key)) {
        let engine = TourActor::new(EngineConfig {
            tour_id: tour_id.clone(),
            app_id: app.clone(),
            app_name: app.clone(),
            doc: doc.clone(),
            page: page.clone(),
            gateway: gateway.clone(),
            renderer: renderer.clone(),
            notifier: notifier.clone(),
            route_filter: RouteFilter::None,
            exit_policy: ExitPolicy::Persist,
        })
        .start();

        let aside = AsideActor::new(tour_id, engine, page.clone()).start();
        aside.do_send(RunAside);
        launched.asides.push(aside);
    }

    Ok(launched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::engine::IsActive;
    use crate::content::testing::FixedContentSource;
    use crate::dom::page::StaticPage;
    use crate::gateway::MemoryGateway;
    use crate::present::testing::{RecordingNotifier, RecordingRenderer};
    use serde_json::{json, Map, Value};
    use std::time::Duration;

    const PAGE: &str = r#"<html><body><div id="content"></div></body></html>"#;

    fn doc() -> Map<String, Value> {
        json!({
            "files": { "name": "Files", "steps": [ { "paragraphs": ["hello"] } ] },
            "files-aside-sharing": { "steps": [ { "paragraphs": ["share"] } ] },
            "files-aside": { "steps": [ { "paragraphs": ["panel"] } ] },
            "calendar-aside": { "steps": [ { "paragraphs": ["other app"] } ] }
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn spec(viewport: (u32, u32)) -> BootSpec {
        BootSpec {
            boot: BootInfo {
                app_name: "files".to_string(),
                app_version: "1.0".to_string(),
                server_version: "29".to_string(),
            },
            viewport,
            user_language: "en".to_string(),
            route_plan: None,
        }
    }

    async fn boot(viewport: (u32, u32)) -> (Arc<StaticPage>, Arc<RecordingRenderer>, Launched) {
        let page = Arc::new(StaticPage::from_html(PAGE, "/apps/files"));
        let renderer = Arc::new(RecordingRenderer::default());
        let source = Arc::new(FixedContentSource::new(doc(), Map::new()));
        let launched = launch(
            page.clone(),
            Arc::new(MemoryGateway::new()),
            source,
            renderer.clone(),
            Arc::new(RecordingNotifier::default()),
            spec(viewport),
        )
        .await
        .unwrap();
        (page, renderer, launched)
    }

    #[actix_rt::test]
    async fn test_small_viewport_stays_quiet() {
        let (_page, renderer, launched) = boot((640, 480)).await;
        assert!(launched.main.is_none());
        assert!(launched.asides.is_empty());
        assert!(renderer.steps().is_empty());
    }

    #[actix_rt::test]
    async fn test_boot_starts_main_tour() {
        let (_page, renderer, launched) = boot((1280, 800)).await;
        actix_rt::time::sleep(Duration::from_millis(100)).await;

        assert!(launched.main.as_ref().unwrap().send(IsActive).await.unwrap());
        assert_eq!(renderer.steps(), vec![0]);
    }

    #[actix_rt::test]
    async fn test_boot_supervises_this_apps_asides_only() {
        let (_page, _renderer, launched) = boot((1280, 800)).await;
        // files-aside and files-aside-sharing, not calendar-aside.
        assert_eq!(launched.asides.len(), 2);
    }

    #[actix_rt::test]
    async fn test_unknown_app_boots_nothing() {
        let page = Arc::new(StaticPage::from_html(PAGE, "/apps/deck"));
        let source = Arc::new(FixedContentSource::new(doc(), Map::new()));
        let mut boot_spec = spec((1280, 800));
        boot_spec.boot.app_name = "deck".to_string();

        let launched = launch(
            page,
            Arc::new(MemoryGateway::new()),
            source,
            Arc::new(RecordingRenderer::default()),
            Arc::new(RecordingNotifier::default()),
            boot_spec,
        )
        .await
        .unwrap();

        assert!(launched.main.is_none());
        assert!(launched.asides.is_empty());
    }
}
