use crate::{event::Event, types::FilterConfig};

/// Evaluates a subscription filter against an event. An absent filter
/// matches everything.
pub fn matches(filter: Option<&FilterConfig>, event: &dyn Event) -> bool {
    filter.map_or(true, |filter| filter.matches(event))
}

impl FilterConfig {
    pub fn matches(&self, event: &dyn Event) -> bool {
        if self.min_scale > 0 && event.severity() < event.severity_for_scale(self.min_scale) {
            return false;
        }

        if self.prefectures.is_empty() {
            return true;
        }

        let areas = event.affected_areas();
        areas.iter().any(|area| {
            self.prefectures.iter().any(|pref| area == pref || area.starts_with(pref.as_str()))
        })
    }
}
