pub mod page;
pub mod parser;

#[cfg(test)]
mod page_test;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Represents a node in the page tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// An element node, containing a tag name, attributes, and children.
    Element(ElementData),
    /// A text node.
    Text(String),
    /// A comment node.
    Comment(String),
}

/// Represents the data associated with an element node.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub id: u64, // Unique identifier for this node
    pub tag_name: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<Node>,
}

impl ElementData {
    /// Helper function to get the HTML id attribute.
    pub fn html_id(&self) -> Option<&String> {
        self.attributes.get("id")
    }

    pub fn classes(&self) -> Vec<String> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().iter().any(|c| c == class)
    }
}

/// Mutation and navigation notifications, fanned out to every engine.
/// Added/removed events carry only the subtree root, like a childList
/// mutation record.
#[derive(Debug, Clone)]
pub enum PageEvent {
    NodeAdded {
        id: u64,
        tag: String,
        html_id: Option<String>,
        classes: Vec<String>,
    },
    NodeRemoved {
        id: u64,
        tag: String,
        html_id: Option<String>,
        classes: Vec<String>,
    },
    ClassChanged {
        id: u64,
        html_id: Option<String>,
        classes: Vec<String>,
    },
    UrlChanged {
        url: String,
    },
}

/// The live page, as far as the tour engines are concerned.
///
/// Implementations must be cheap to query: engines re-query selectors on
/// every page event while waiting for elements to appear.
#[async_trait]
pub trait PageHost: Send + Sync {
    /// First element matching the selector, in document order.
    async fn query(&self, selector: &str) -> Option<u64>;
    /// Attached and not `display: none` anywhere up the ancestor chain.
    async fn is_visible(&self, node: u64) -> bool;
    async fn click(&self, node: u64);
    /// Override an element's display style. An empty value restores it.
    async fn set_display(&self, node: u64, value: &str);
    /// Replace an element's children with the given markup.
    async fn set_inner_html(&self, node: u64, html: &str);
    /// Append markup under the first element matching `parent`. Returns the
    /// first inserted element, if any.
    async fn insert_html(&self, parent: &str, html: &str) -> Option<u64>;
    async fn remove(&self, node: u64);
    async fn get_attribute(&self, node: u64, name: &str) -> Option<String>;
    async fn location(&self) -> String;
    async fn navigate(&self, url: &str);
    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;
}

/// Bounded wait for a selector to resolve: query now, re-query on every page
/// event, give up at the deadline with one final query. This replaces the
/// fixed sleeps the behavior was originally synchronized with.
pub async fn wait_for_selector(page: &Arc<dyn PageHost>, selector: &str, timeout: Duration) -> Option<u64> {
    if let Some(id) = page.query(selector).await {
        return Some(id);
    }

    let mut events = page.subscribe();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => {
                if let Some(id) = page.query(selector).await {
                    return Some(id);
                }
            }
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                return page.query(selector).await;
            }
        }
    }
}

/// One compound of a selector: optional tag, optional `#id`, classes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl SimpleSelector {
    pub fn matches(&self, element: &ElementData) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag_name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.html_id() != Some(id) {
                return false;
            }
        }
        self.classes.iter().all(|class| element.has_class(class))
    }
}

/// Parses the selector subset the tour data uses: `tag`, `#id`, `.class`
/// compounds joined by the descendant combinator (whitespace).
pub fn parse_selector(selector: &str) -> Vec<SimpleSelector> {
    selector.split_whitespace().map(parse_compound).collect()
}

fn parse_compound(token: &str) -> SimpleSelector {
    let mut selector = SimpleSelector::default();
    let mut rest = token;

    let boundary = |s: &str| s.find(['#', '.']).unwrap_or(s.len());

    let tag_end = boundary(rest);
    if tag_end > 0 {
        selector.tag = Some(rest[..tag_end].to_string());
    }
    rest = &rest[tag_end..];

    while !rest.is_empty() {
        let (marker, tail) = rest.split_at(1);
        let end = boundary(tail);
        let name = &tail[..end];
        match marker {
            "#" => selector.id = Some(name.to_string()),
            "." => selector.classes.push(name.to_string()),
            _ => {}
        }
        rest = &tail[end..];
    }

    selector
}
