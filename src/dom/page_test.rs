use crate::dom::page::{PageEffect, StaticPage};
use crate::dom::{wait_for_selector, PageEvent, PageHost};
use std::sync::Arc;
use std::time::Duration;

const PAGE: &str = r#"
<html><body>
    <div id="content">
        <button id="menu-toggle" class="primary">Menu</button>
        <span id="hint" style="display: none">psst</span>
        <div id="wrapper" style="display:none"><p id="inside">text</p></div>
    </div>
</body></html>
"#;

#[actix_rt::test]
async fn test_query_by_id_class_and_tag() {
    let page = StaticPage::from_html(PAGE, "/apps/notes");

    assert!(page.query("#menu-toggle").await.is_some());
    assert!(page.query("button.primary").await.is_some());
    assert!(page.query("div#content button").await.is_some());
    assert!(page.query("#nope").await.is_none());
    assert!(page.query("span.primary").await.is_none());
}

#[actix_rt::test]
async fn test_visibility_follows_display_chain() {
    let page = StaticPage::from_html(PAGE, "/");

    let button = page.query("#menu-toggle").await.unwrap();
    assert!(page.is_visible(button).await);

    let hint = page.query("#hint").await.unwrap();
    assert!(!page.is_visible(hint).await);

    // Hidden through an ancestor, not its own style.
    let inside = page.query("#inside").await.unwrap();
    assert!(!page.is_visible(inside).await);
}

#[actix_rt::test]
async fn test_display_override_reveals_and_restores() {
    let page = StaticPage::from_html(PAGE, "/");
    let hint = page.query("#hint").await.unwrap();

    page.set_display(hint, "block").await;
    assert!(page.is_visible(hint).await);

    page.set_display(hint, "").await;
    assert!(!page.is_visible(hint).await);
}

#[actix_rt::test]
async fn test_click_effects_and_events() {
    let page = StaticPage::from_html(PAGE, "/");
    page.on_click(
        "#menu-toggle",
        vec![PageEffect::Insert {
            parent: "#content".to_string(),
            html: "<ul id=\"menu\"><li>item</li></ul>".to_string(),
        }],
    );

    let mut events = page.subscribe();
    let button = page.query("#menu-toggle").await.unwrap();
    page.click(button).await;

    assert!(page.query("#menu").await.is_some());
    match events.recv().await.unwrap() {
        PageEvent::NodeAdded { html_id, tag, .. } => {
            assert_eq!(html_id.as_deref(), Some("menu"));
            assert_eq!(tag, "ul");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[actix_rt::test]
async fn test_click_without_rule_is_noop() {
    let page = StaticPage::from_html(PAGE, "/");
    let button = page.query("#menu-toggle").await.unwrap();
    page.click(button).await;
    assert!(page.query("#menu").await.is_none());
}

#[actix_rt::test]
async fn test_set_class_emits_class_changed() {
    let page = StaticPage::from_html(PAGE, "/");
    let mut events = page.subscribe();

    assert!(page.set_class("#menu-toggle", "active", true));
    match events.recv().await.unwrap() {
        PageEvent::ClassChanged { html_id, classes, .. } => {
            assert_eq!(html_id.as_deref(), Some("menu-toggle"));
            assert!(classes.contains(&"active".to_string()));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Setting an already-present class is not a change.
    assert!(!page.set_class("#menu-toggle", "active", true));
}

#[actix_rt::test]
async fn test_remove_emits_node_removed() {
    let page = StaticPage::from_html(PAGE, "/");
    let mut events = page.subscribe();

    let hint = page.query("#hint").await.unwrap();
    page.remove(hint).await;

    assert!(page.query("#hint").await.is_none());
    match events.recv().await.unwrap() {
        PageEvent::NodeRemoved { html_id, .. } => assert_eq!(html_id.as_deref(), Some("hint")),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[actix_rt::test]
async fn test_set_inner_html_replaces_children() {
    let page = StaticPage::from_html(PAGE, "/");
    let content = page.query("#content").await.unwrap();

    page.set_inner_html(content, "<div id=\"fresh\">new</div>").await;

    assert!(page.query("#menu-toggle").await.is_none());
    assert!(page.query("#fresh").await.is_some());
    let html = page.outer_html(content).unwrap();
    assert!(html.contains("fresh"));
    assert!(html.contains("new"));
}

#[actix_rt::test]
async fn test_navigate_updates_location_and_notifies() {
    let page = StaticPage::from_html(PAGE, "/apps/notes");
    let mut events = page.subscribe();

    page.navigate("/apps/notes/settings").await;

    assert_eq!(page.location().await, "/apps/notes/settings");
    match events.recv().await.unwrap() {
        PageEvent::UrlChanged { url } => assert_eq!(url, "/apps/notes/settings"),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[actix_rt::test]
async fn test_wait_for_selector_resolves_on_event() {
    let page: Arc<dyn PageHost> = Arc::new(StaticPage::from_html(PAGE, "/"));
    let waiter = {
        let page = page.clone();
        actix_rt::spawn(async move { wait_for_selector(&page, "#late", Duration::from_millis(400)).await })
    };

    actix_rt::time::sleep(Duration::from_millis(50)).await;
    page.insert_html("#content", "<div id=\"late\"></div>").await;

    let found = waiter.await.unwrap();
    assert!(found.is_some());
}

#[actix_rt::test]
async fn test_wait_for_selector_times_out() {
    let page: Arc<dyn PageHost> = Arc::new(StaticPage::from_html(PAGE, "/"));
    let found = wait_for_selector(&page, "#never", Duration::from_millis(100)).await;
    assert!(found.is_none());
}
