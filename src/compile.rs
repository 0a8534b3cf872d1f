use crate::errors::UsherError;
use crate::model::{RawTour, TooltipPayload, TourLink};
use serde_json::{Map, Value};

/// How a step's target is found when the engine is about to show it.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveMode {
    /// No target selector; the tooltip floats in the center.
    Floating,
    /// Target is re-queried right before the step is shown; the element may
    /// not exist at compile time.
    Lazy { selector: String, position: Option<String> },
    /// Target only exists after the opener has been clicked. The opener is
    /// highlighted until the real target resolves.
    Gated { opener: String, target: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStep {
    pub mode: ResolveMode,
    /// Node the step currently points at. Filled in by the engine.
    pub resolved: Option<u64>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatedEntry {
    pub step_index: usize,
    pub target: Option<String>,
    pub opener: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LazyEntry {
    pub step_index: usize,
    pub selector: String,
    pub position: Option<String>,
}

/// An executable step program for one tour.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTour {
    pub tour_id: String,
    pub app_name: Option<String>,
    pub steps: Vec<CompiledStep>,
    pub hover_selectors: Vec<String>,
    pub gated: Vec<GatedEntry>,
    pub lazy: Vec<LazyEntry>,
    pub payloads: Vec<TooltipPayload>,
}

impl CompiledTour {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn last_step(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }
}

/// Compiles one tour of a merged document into its step program.
///
/// Rules, in step order: hover steps register their selector for reveal; an
/// empty-string selector counts as absent; an `open` trigger makes the step
/// gated (the opener is what gets highlighted first); otherwise a selector
/// makes the step lazy. The final step's payload always offers "run again".
pub fn compile(tour_id: &str, doc: &Map<String, Value>) -> Result<CompiledTour, UsherError> {
    let raw = doc
        .get(tour_id)
        .ok_or_else(|| UsherError::Document(format!("no tour '{}' in document", tour_id)))?;
    let raw: RawTour = serde_json::from_value(raw.clone())?;

    let mut steps = Vec::with_capacity(raw.steps.len());
    let mut hover_selectors = Vec::new();
    let mut gated = Vec::new();
    let mut lazy = Vec::new();
    let mut payloads = Vec::with_capacity(raw.steps.len());

    for (step_index, step) in raw.steps.iter().enumerate() {
        let element = step.element.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        if step.hover {
            if let Some(selector) = &element {
                hover_selectors.push(selector.clone());
            }
        }

        let mode = if let Some(opener) = &step.open {
            gated.push(GatedEntry {
                step_index,
                target: element.clone(),
                opener: opener.clone(),
            });
            ResolveMode::Gated {
                opener: opener.clone(),
                target: element.clone(),
            }
        } else if let Some(selector) = &element {
            lazy.push(LazyEntry {
                step_index,
                selector: selector.clone(),
                position: step.position.clone(),
            });
            ResolveMode::Lazy {
                selector: selector.clone(),
                position: step.position.clone(),
            }
        } else {
            ResolveMode::Floating
        };

        steps.push(CompiledStep {
            mode,
            resolved: None,
            position: step.position.clone(),
        });

        payloads.push(TooltipPayload {
            paragraphs: step.paragraphs.clone(),
            img: step.img.clone(),
            button: false,
            links: step.links.as_ref().map(|links| {
                links
                    .iter()
                    .map(|link| TourLink {
                        link_id: link.clone(),
                        link_name: linked_tour_name(doc, link),
                    })
                    .collect()
            }),
            choices: step.choices.clone(),
        });
    }

    // Last tooltip offers to run the tour again.
    if let Some(last) = payloads.last_mut() {
        last.button = true;
    }

    Ok(CompiledTour {
        tour_id: tour_id.to_string(),
        app_name: raw.name,
        steps,
        hover_selectors,
        gated,
        lazy,
        payloads,
    })
}

/// Display name for a linked tour: its declared `name`, or the raw id.
fn linked_tour_name(doc: &Map<String, Value>, link: &str) -> String {
    doc.get(link)
        .and_then(|tour| tour.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| link.to_string())
}
