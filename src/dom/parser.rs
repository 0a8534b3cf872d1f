use scraper::{Html, Node as ScraperNode};

use super::{ElementData, Node};

/// Parses a full HTML document into the page tree. The document node is
/// wrapped in a synthetic root element so the rest of the code can treat the
/// root as an Element.
pub fn parse(html: &str, next_id: &mut u64) -> Node {
    let scraper_dom = Html::parse_document(html);
    convert_node(scraper_dom.tree.root(), next_id)
}

/// Parses an HTML fragment and returns its top-level nodes. The parser wraps
/// fragments in an `<html>` element; that wrapper is peeled off here.
pub fn parse_fragment(html: &str, next_id: &mut u64) -> Vec<Node> {
    let scraper_dom = Html::parse_fragment(html);
    let root = convert_node(scraper_dom.tree.root(), next_id);
    unwrap_fragment(root)
}

fn unwrap_fragment(root: Node) -> Vec<Node> {
    match root {
        Node::Element(el) if el.tag_name == "document" || el.tag_name == "html" => {
            el.children.into_iter().flat_map(unwrap_fragment).collect()
        }
        other => vec![other],
    }
}

fn convert_node(scraper_node: ego_tree::NodeRef<ScraperNode>, next_id: &mut u64) -> Node {
    match scraper_node.value() {
        ScraperNode::Document | ScraperNode::Fragment => {
            let id = bump(next_id);
            let children = scraper_node.children().map(|c| convert_node(c, next_id)).collect();

            Node::Element(ElementData {
                id,
                tag_name: "document".to_string(),
                attributes: std::collections::HashMap::new(),
                children,
            })
        }
        ScraperNode::Element(el) => {
            let id = bump(next_id);
            let attributes = el.attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            let children = scraper_node.children().map(|c| convert_node(c, next_id)).collect();

            Node::Element(ElementData {
                id,
                tag_name: el.name().to_string(),
                attributes,
                children,
            })
        }
        ScraperNode::Text(text) => Node::Text(text.text.to_string()),
        ScraperNode::Comment(comment) => Node::Comment(comment.comment.to_string()),
        _ => Node::Comment("unsupported node type".to_string()),
    }
}

fn bump(next_id: &mut u64) -> u64 {
    let id = *next_id;
    *next_id += 1;
    id
}
