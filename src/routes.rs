use crate::compile::CompiledTour;

/// The two logical pages a split tour runs across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Primary,
    Secondary,
}

/// Substring patterns identifying the two routes of a split tour, plus the
/// canonical path of the secondary one.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub primary_needle: String,
    pub secondary_needle: String,
    pub secondary_path: String,
}

impl RoutePlan {
    /// Classifies a location. Substring matching keeps this tolerant of a
    /// path-rewriting proxy prefix; unrecognized shapes default to primary.
    pub fn classify(&self, location: &str) -> Route {
        if location.contains(&self.secondary_needle) {
            Route::Secondary
        } else {
            Route::Primary
        }
    }

    /// Canonical secondary URL, preserving whatever prefix the current
    /// location carries before the recognized route fragment.
    pub fn secondary_url(&self, location: &str) -> String {
        let prefix_end = location
            .find(&self.primary_needle)
            .or_else(|| location.find(&self.secondary_needle));
        match prefix_end {
            Some(index) => format!("{}{}", &location[..index], self.secondary_path),
            None => self.secondary_path.clone(),
        }
    }
}

/// Cuts a step program down to the subset valid for the classified route.
///
/// Primary keeps only the landing step, with its "run again" button
/// suppressed (the tour isn't over yet). Secondary keeps the rest, re-based
/// so the side tables still line up, and the button lands on the new final
/// step.
pub fn filter_for_route(mut tour: CompiledTour, route: Route) -> CompiledTour {
    match route {
        Route::Primary => {
            tour.steps.truncate(1);
            tour.payloads.truncate(1);
            tour.gated.retain(|entry| entry.step_index == 0);
            tour.lazy.retain(|entry| entry.step_index == 0);
            if let Some(payload) = tour.payloads.last_mut() {
                payload.button = false;
            }
        }
        Route::Secondary => {
            let dropped = tour.steps.len().min(1);
            tour.steps.drain(..dropped);
            tour.payloads.drain(..dropped.min(tour.payloads.len()));

            tour.gated.retain(|entry| entry.step_index >= dropped);
            for entry in &mut tour.gated {
                entry.step_index -= dropped;
            }
            tour.lazy.retain(|entry| entry.step_index >= dropped);
            for entry in &mut tour.lazy {
                entry.step_index -= dropped;
            }

            if let Some(payload) = tour.payloads.last_mut() {
                payload.button = true;
            }
        }
    }
    tour
}
