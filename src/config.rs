//! Markup surface configuration.

use serde::{Deserialize, Serialize};

/// Names used to recognise directives and component attributes in markup.
///
/// Every binding reads its attribute names from here, so a host can rename
/// the whole directive surface in one place.
///
/// # Example
///
/// ```rust
/// use oxide_bind::Config;
///
/// let config = Config::default().with_prefix("x-");
/// assert_eq!(config.event_directive(), "x-on");
/// assert_eq!(config.default_action_class("created"), "x-created");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix shared by every binding directive attribute.
    pub prefix: String,
    /// Attribute naming an external template source on a component tag.
    pub template_source_attribute: String,
    /// Attribute listing the properties that bind in both directions.
    pub two_way_attribute: String,
    /// Prefix of per-event attributes on a component tag.
    pub event_attribute_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: "ox-".into(),
            template_source_attribute: "src".into(),
            two_way_attribute: "two-way".into(),
            event_attribute_prefix: "on-".into(),
        }
    }
}

impl Config {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_template_source_attribute(mut self, name: impl Into<String>) -> Self {
        self.template_source_attribute = name.into();
        self
    }

    pub fn with_two_way_attribute(mut self, name: impl Into<String>) -> Self {
        self.two_way_attribute = name.into();
        self
    }

    pub fn with_event_attribute_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.event_attribute_prefix = prefix.into();
        self
    }

    /// The combined `event: expression; ...` directive attribute.
    pub fn event_directive(&self) -> String {
        format!("{}on", self.prefix)
    }

    /// Whether `attribute` belongs to the binding directive namespace.
    pub fn is_directive(&self, attribute: &str) -> bool {
        !self.prefix.is_empty() && attribute.starts_with(&self.prefix)
    }

    /// CSS class used when an action descriptor is empty.
    pub fn default_action_class(&self, phase: &str) -> String {
        format!("{}{}", self.prefix, phase)
    }
}
