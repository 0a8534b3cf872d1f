use super::{parse_selector, parser, ElementData, Node, PageEvent, PageHost, SimpleSelector};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// A scripted DOM mutation, applied when a registered element is clicked.
#[derive(Debug, Clone)]
pub enum PageEffect {
    Insert { parent: String, html: String },
    Remove { selector: String },
    SetClass { selector: String, class: String, on: bool },
    Navigate { url: String },
}

struct ClickRule {
    selector: String,
    effects: Vec<PageEffect>,
}

struct PageInner {
    root: Node,
    next_id: u64,
    location: String,
    display_overrides: HashMap<u64, String>,
    click_rules: Vec<ClickRule>,
}

/// A deterministic page: an HTML snapshot plus scripted click effects.
///
/// Backs the `check` command and the test suite. Clicks, insertions and
/// class flips emit the same `PageEvent`s a live page bridge would.
pub struct StaticPage {
    inner: Mutex<PageInner>,
    events: broadcast::Sender<PageEvent>,
}

impl StaticPage {
    pub fn from_html(html: &str, location: &str) -> Self {
        let mut next_id = 0;
        let root = parser::parse(html, &mut next_id);
        let (events, _) = broadcast::channel(100);
        StaticPage {
            inner: Mutex::new(PageInner {
                root,
                next_id,
                location: location.to_string(),
                display_overrides: HashMap::new(),
                click_rules: Vec::new(),
            }),
            events,
        }
    }

    /// Registers mutations to apply whenever an element matching `selector`
    /// is clicked.
    pub fn on_click(&self, selector: &str, effects: Vec<PageEffect>) {
        let mut inner = self.inner.lock().unwrap();
        inner.click_rules.push(ClickRule {
            selector: selector.to_string(),
            effects,
        });
    }

    /// Adds or removes a class on the first matching element.
    pub fn set_class(&self, selector: &str, class: &str, on: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let events = apply_set_class(&mut inner, selector, class, on);
        let changed = !events.is_empty();
        drop(inner);
        self.emit(events);
        changed
    }

    pub fn append_html(&self, parent: &str, html: &str) -> Option<u64> {
        let mut inner = self.inner.lock().unwrap();
        let (first, events) = apply_insert(&mut inner, parent, html);
        drop(inner);
        self.emit(events);
        first
    }

    pub fn remove_selector(&self, selector: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let events = apply_remove(&mut inner, selector);
        let removed = !events.is_empty();
        drop(inner);
        self.emit(events);
        removed
    }

    /// Serialized subtree of a node, for assertions.
    pub fn outer_html(&self, node: u64) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        find(&inner.root, node).map(|el| {
            let mut out = String::new();
            serialize_element(el, &mut out);
            out
        })
    }

    fn emit(&self, events: Vec<PageEvent>) {
        for event in events {
            let _ = self.events.send(event);
        }
    }

    fn query_sync(&self, selector: &str) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        query(&inner.root, selector)
    }
}

#[async_trait]
impl PageHost for StaticPage {
    async fn query(&self, selector: &str) -> Option<u64> {
        self.query_sync(selector)
    }

    async fn is_visible(&self, node: u64) -> bool {
        let inner = self.inner.lock().unwrap();
        let mut chain = Vec::new();
        if !path_elements(&inner.root, node, &mut chain) {
            return false;
        }
        chain
            .iter()
            .all(|el| effective_display(el, &inner.display_overrides).as_deref() != Some("none"))
    }

    async fn click(&self, node: u64) {
        let mut inner = self.inner.lock().unwrap();
        let matching: Vec<Vec<PageEffect>> = inner
            .click_rules
            .iter()
            .filter(|rule| query(&inner.root, &rule.selector) == Some(node))
            .map(|rule| rule.effects.clone())
            .collect();

        let mut events = Vec::new();
        for effects in matching {
            for effect in effects {
                match effect {
                    PageEffect::Insert { parent, html } => {
                        let (_, mut ev) = apply_insert(&mut inner, &parent, &html);
                        events.append(&mut ev);
                    }
                    PageEffect::Remove { selector } => {
                        events.append(&mut apply_remove(&mut inner, &selector));
                    }
                    PageEffect::SetClass { selector, class, on } => {
                        events.append(&mut apply_set_class(&mut inner, &selector, &class, on));
                    }
                    PageEffect::Navigate { url } => {
                        inner.location = url.clone();
                        events.push(PageEvent::UrlChanged { url });
                    }
                }
            }
        }
        drop(inner);
        self.emit(events);
    }

    async fn set_display(&self, node: u64, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        if value.is_empty() {
            inner.display_overrides.remove(&node);
        } else {
            inner.display_overrides.insert(node, value.to_string());
        }
    }

    async fn set_inner_html(&self, node: u64, html: &str) {
        let mut inner = self.inner.lock().unwrap();

        let mut counter = inner.next_id;
        let new_children = parser::parse_fragment(html, &mut counter);
        inner.next_id = counter;

        let mut events = Vec::new();
        if let Some(el) = find_mut(&mut inner.root, node) {
            for child in &el.children {
                if let Some(event) = removal_event(child) {
                    events.push(event);
                }
            }
            for child in &new_children {
                if let Some(event) = addition_event(child) {
                    events.push(event);
                }
            }
            el.children = new_children;
        }
        drop(inner);
        self.emit(events);
    }

    async fn insert_html(&self, parent: &str, html: &str) -> Option<u64> {
        self.append_html(parent, html)
    }

    async fn remove(&self, node: u64) {
        let mut inner = self.inner.lock().unwrap();
        let mut events = Vec::new();
        if let Some(removed) = detach(&mut inner.root, node) {
            if let Some(event) = removal_event(&removed) {
                events.push(event);
            }
        }
        drop(inner);
        self.emit(events);
    }

    async fn get_attribute(&self, node: u64, name: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        find(&inner.root, node).and_then(|el| el.attributes.get(name).cloned())
    }

    async fn location(&self) -> String {
        self.inner.lock().unwrap().location.clone()
    }

    async fn navigate(&self, url: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.location = url.to_string();
        drop(inner);
        self.emit(vec![PageEvent::UrlChanged { url: url.to_string() }]);
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }
}

// --- Mutations over the locked page state ---

fn apply_insert(inner: &mut PageInner, parent: &str, html: &str) -> (Option<u64>, Vec<PageEvent>) {
    let mut counter = inner.next_id;
    let nodes = parser::parse_fragment(html, &mut counter);
    inner.next_id = counter;

    let Some(parent_id) = query(&inner.root, parent) else {
        return (None, Vec::new());
    };

    let mut first = None;
    let mut events = Vec::new();
    for node in &nodes {
        if let Node::Element(el) = node {
            first.get_or_insert(el.id);
        }
        if let Some(event) = addition_event(node) {
            events.push(event);
        }
    }

    if let Some(el) = find_mut(&mut inner.root, parent_id) {
        el.children.extend(nodes);
    }
    (first, events)
}

fn apply_remove(inner: &mut PageInner, selector: &str) -> Vec<PageEvent> {
    let Some(id) = query(&inner.root, selector) else {
        return Vec::new();
    };
    match detach(&mut inner.root, id) {
        Some(removed) => removal_event(&removed).into_iter().collect(),
        None => Vec::new(),
    }
}

fn apply_set_class(inner: &mut PageInner, selector: &str, class: &str, on: bool) -> Vec<PageEvent> {
    let Some(id) = query(&inner.root, selector) else {
        return Vec::new();
    };
    let Some(el) = find_mut(&mut inner.root, id) else {
        return Vec::new();
    };

    let mut classes = el.classes();
    let present = classes.iter().any(|c| c == class);
    if on && !present {
        classes.push(class.to_string());
    } else if !on && present {
        classes.retain(|c| c != class);
    } else {
        return Vec::new();
    }
    el.attributes.insert("class".to_string(), classes.join(" "));

    vec![PageEvent::ClassChanged {
        id: el.id,
        html_id: el.html_id().cloned(),
        classes,
    }]
}

// --- Tree walking ---

/// First element matching the selector, in document order.
pub fn query(root: &Node, selector: &str) -> Option<u64> {
    let selectors = parse_selector(selector);
    if selectors.is_empty() {
        return None;
    }
    let mut ancestors = Vec::new();
    query_in(root, &selectors, &mut ancestors)
}

fn query_in<'a>(node: &'a Node, selectors: &[SimpleSelector], ancestors: &mut Vec<&'a ElementData>) -> Option<u64> {
    let Node::Element(el) = node else { return None };

    if matches_chain(ancestors, el, selectors) {
        return Some(el.id);
    }

    ancestors.push(el);
    for child in &el.children {
        if let Some(found) = query_in(child, selectors, ancestors) {
            ancestors.pop();
            return Some(found);
        }
    }
    ancestors.pop();
    None
}

fn matches_chain(ancestors: &[&ElementData], el: &ElementData, selectors: &[SimpleSelector]) -> bool {
    let Some((last, outer)) = selectors.split_last() else {
        return false;
    };
    if !last.matches(el) {
        return false;
    }

    let mut index = 0;
    for ancestor in ancestors {
        if index < outer.len() && outer[index].matches(ancestor) {
            index += 1;
        }
    }
    index == outer.len()
}

fn find(node: &Node, id: u64) -> Option<&ElementData> {
    let Node::Element(el) = node else { return None };
    if el.id == id {
        return Some(el);
    }
    el.children.iter().find_map(|child| find(child, id))
}

fn find_mut(node: &mut Node, id: u64) -> Option<&mut ElementData> {
    let Node::Element(el) = node else { return None };
    if el.id == id {
        return Some(el);
    }
    el.children.iter_mut().find_map(|child| find_mut(child, id))
}

fn path_elements<'a>(node: &'a Node, id: u64, chain: &mut Vec<&'a ElementData>) -> bool {
    let Node::Element(el) = node else { return false };
    chain.push(el);
    if el.id == id {
        return true;
    }
    for child in &el.children {
        if path_elements(child, id, chain) {
            return true;
        }
    }
    chain.pop();
    false
}

fn detach(node: &mut Node, id: u64) -> Option<Node> {
    let Node::Element(el) = node else { return None };
    if let Some(index) = el.children.iter().position(|child| matches!(child, Node::Element(c) if c.id == id)) {
        return Some(el.children.remove(index));
    }
    el.children.iter_mut().find_map(|child| detach(child, id))
}

fn effective_display(el: &ElementData, overrides: &HashMap<u64, String>) -> Option<String> {
    if let Some(value) = overrides.get(&el.id) {
        return Some(value.clone());
    }
    let style = el.attributes.get("style")?;
    style.split(';').find_map(|decl| {
        let (key, value) = decl.split_once(':')?;
        if key.trim() == "display" {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

fn addition_event(node: &Node) -> Option<PageEvent> {
    let Node::Element(el) = node else { return None };
    Some(PageEvent::NodeAdded {
        id: el.id,
        tag: el.tag_name.clone(),
        html_id: el.html_id().cloned(),
        classes: el.classes(),
    })
}

fn removal_event(node: &Node) -> Option<PageEvent> {
    let Node::Element(el) = node else { return None };
    Some(PageEvent::NodeRemoved {
        id: el.id,
        tag: el.tag_name.clone(),
        html_id: el.html_id().cloned(),
        classes: el.classes(),
    })
}

fn serialize_element(el: &ElementData, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag_name);
    let mut attrs: Vec<_> = el.attributes.iter().collect();
    attrs.sort();
    for (key, value) in attrs {
        out.push_str(&format!(" {}=\"{}\"", key, value));
    }
    out.push('>');
    for child in &el.children {
        match child {
            Node::Element(child_el) => serialize_element(child_el, out),
            Node::Text(text) => out.push_str(text),
            Node::Comment(_) => {}
        }
    }
    out.push_str(&format!("</{}>", el.tag_name));
}
