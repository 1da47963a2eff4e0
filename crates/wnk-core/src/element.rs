use crate::value::{EventHandler, PropValue, Props};
use serde_json::Value;

/// Tag used for bare text children.
pub const TEXT_TAG: &str = "#text";

/// Immutable description of one UI element, diffed by the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub tag: String,
    pub key: Option<String>,
    pub props: Props,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            key: None,
            props: Props::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        let mut element = Self::new(TEXT_TAG);
        element
            .props
            .insert("children".to_string(), PropValue::String(text.into()));
        element
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    /// Payload of a text element.
    pub fn text_content(&self) -> String {
        self.props
            .get("children")
            .and_then(PropValue::as_text)
            .unwrap_or_default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Sets a prop only when a value is present.
    pub fn prop_opt<V: Into<PropValue>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.prop(name, value),
            None => self,
        }
    }

    pub fn json_prop(self, name: impl Into<String>, value: Value) -> Self {
        self.prop(name, PropValue::Json(value))
    }

    pub fn on(
        self,
        event: impl Into<String>,
        handler: impl Fn(Option<&Value>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.prop(event, EventHandler::new(handler))
    }

    /// Primitive content rendered as the node's inline text.
    pub fn content(mut self, text: impl Into<PropValue>) -> Self {
        self.children.clear();
        self.props.insert("children".to_string(), text.into());
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.drop_inline_text();
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.drop_inline_text();
        self.children.extend(children);
        self
    }

    fn drop_inline_text(&mut self) {
        if self.props.get("children").is_some_and(PropValue::is_text) {
            self.props.remove("children");
        }
    }
}
