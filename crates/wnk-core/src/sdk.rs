//! Element constructors for guest UIs and plugin panels.

use crate::element::Element;
use crate::panel::{ActionItem, Direction, PanelBottom, PanelTop};
use crate::value::{PropValue, number_to_json};
use serde::Serialize;
use serde_json::{Map, Value};

pub const BOX_TAG: &str = "wnk-box";
pub const TEXT_TAG: &str = "wnk-text";
pub const BUTTON_TAG: &str = "wnk-button";
pub const INPUT_TAG: &str = "wnk-input";

/// Marker prop set by every SDK constructor; never serialized.
pub const COMPONENT_MARKER: &str = "$$wnk";

fn component(tag: &str) -> Element {
    Element::new(tag).prop(COMPONENT_MARKER, PropValue::Symbol("wnk-component".to_string()))
}

pub fn boxed() -> Element {
    component(BOX_TAG)
}

pub fn text(content: impl Into<PropValue>) -> Element {
    component(TEXT_TAG).content(content)
}

pub fn button(label: impl Into<String>) -> Element {
    component(BUTTON_TAG).content(label.into())
}

pub fn input(value: impl Into<String>) -> Element {
    component(INPUT_TAG).prop("value", value.into())
}

/// Panel root. Header, footer and actions are attached with the builder
/// methods below.
pub fn panel(top: &PanelTop) -> Element {
    boxed().with_top(top)
}

pub fn flex() -> Element {
    boxed().prop("layout", "flex")
}

pub fn grid_items(columns: Option<u32>, gap: Option<f64>) -> Element {
    let mut style = Map::new();
    style.insert("display".to_string(), Value::from("grid"));
    if let Some(columns) = columns {
        style.insert("gridColumns".to_string(), Value::from(columns));
    }
    if let Some(gap) = gap {
        style.insert("gridColumnGap".to_string(), number_to_json(gap));
        style.insert("gridRowGap".to_string(), number_to_json(gap));
    }
    boxed()
        .prop("layout", "grid")
        .json_prop("style", Value::Object(style))
}

/// A leaf box the panel normalizer reads as one item.
pub fn item(id: Option<&str>, title: impl Into<String>, subtitle: impl Into<String>) -> Element {
    boxed()
        .prop_opt("id", id)
        .prop("title", title.into())
        .prop("subtitle", subtitle.into())
}

fn to_prop<T: Serialize>(value: &T) -> PropValue {
    serde_json::to_value(value)
        .map(PropValue::Json)
        .unwrap_or(PropValue::Null)
}

impl Element {
    pub fn with_top(self, top: &PanelTop) -> Self {
        self.prop("top", to_prop(top))
    }

    pub fn with_bottom(self, bottom: &PanelBottom) -> Self {
        self.prop("bottom", to_prop(bottom))
    }

    pub fn with_actions(self, actions: &[ActionItem]) -> Self {
        self.prop("actions", to_prop(&actions))
    }

    pub fn dir(self, dir: Direction) -> Self {
        self.prop("dir", dir.as_str())
    }

    pub fn gap(self, gap: f64) -> Self {
        self.prop("gap", gap)
    }

    pub fn style(self, style: Value) -> Self {
        self.json_prop("style", style)
    }

    pub fn has_actions(self) -> Self {
        self.prop("has_actions", true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{panel_from_serialized_root, PanelDefaults, PanelItem, PanelNode};
    use crate::render::render_once;
    use crate::tree::NodeIdGen;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn marker_prop_never_reaches_the_wire() {
        let snapshot = render_once(&text("hi"), &NodeIdGen::new()).expect("snapshot");
        assert!(snapshot.prop(COMPONENT_MARKER).is_none());
        assert_eq!(snapshot.prop("value"), Some(&json!("hi")));
    }

    #[test]
    fn grid_items_writes_layout_and_style() {
        let el = grid_items(Some(3), Some(6.0));
        assert_eq!(el.props.get("layout"), Some(&PropValue::from("grid")));
        assert_eq!(
            el.props.get("style"),
            Some(&PropValue::Json(json!({
                "display": "grid",
                "gridColumns": 3,
                "gridColumnGap": 6,
                "gridRowGap": 6
            })))
        );
    }

    #[test]
    fn panel_helpers_normalize_end_to_end() {
        let el = panel(&PanelTop::header("Stats", None))
            .with_bottom(&PanelBottom::Info {
                text: "footer".to_string(),
            })
            .with_actions(&[ActionItem::new("copy", "Copy")])
            .dir(Direction::Vertical)
            .gap(8.0)
            .child(flex().child(item(Some("a"), "A", "first")))
            .child(grid_items(Some(2), None).child(item(None, "B", "")));

        let ids = NodeIdGen::new();
        let root = render_once(&el, &ids);
        let rendered = panel_from_serialized_root(root.as_ref(), &PanelDefaults::default());

        assert_eq!(rendered.panel.top, PanelTop::header("Stats", None));
        assert_eq!(rendered.actions, vec![ActionItem::new("copy", "Copy")]);
        assert_eq!(
            rendered.panel.main,
            PanelNode::Box {
                dir: Some(Direction::Vertical),
                gap: Some(8.0),
                children: vec![
                    PanelNode::Flex {
                        items: vec![PanelItem::new("A", "first").with_id("a")]
                    },
                    PanelNode::Grid {
                        columns: Some(2.0),
                        gap: None,
                        items: vec![PanelItem::new("B", "")]
                    },
                ],
            }
        );
    }
}
