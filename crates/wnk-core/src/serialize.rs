use crate::tree::{NodeArena, NodeId, NodeKind};
use crate::value::{PropValue, INTERNAL_PROPS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const RENDER_PAYLOAD_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default)]
    pub children: Vec<SerializedNode>,
}

impl SerializedNode {
    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    pub fn node_id(&self) -> Option<&str> {
        self.props.get("_nodeId").and_then(Value::as_str)
    }
}

/// Full-tree snapshot sent whenever the live view commits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderPayload {
    pub version: u32,
    pub root: Option<SerializedNode>,
}

impl RenderPayload {
    pub fn new(root: Option<SerializedNode>) -> Self {
        Self {
            version: RENDER_PAYLOAD_VERSION,
            root,
        }
    }
}

/// `onPress` -> `_hasOnPress`.
pub fn handler_flag_name(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => format!("_has{}{}", first.to_uppercase(), chars.as_str()),
        None => "_has".to_string(),
    }
}

pub fn serialize_props(id: NodeId, props: &crate::value::Props, text: Option<&str>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in props {
        if INTERNAL_PROPS.contains(&key.as_str()) {
            continue;
        }
        match value {
            PropValue::Symbol(_) => continue,
            PropValue::Handler(_) => {
                out.insert(handler_flag_name(key), Value::Bool(true));
            }
            other => {
                if let Some(json) = other.to_json() {
                    out.insert(key.clone(), json);
                }
            }
        }
    }
    out.insert("_nodeId".to_string(), Value::String(id.to_string()));
    if let Some(text) = text {
        out.insert("value".to_string(), Value::String(text.to_string()));
    }
    out
}

/// Depth-first projection of `id` and its subtree. Dangling child ids are
/// skipped; `None` only when `id` itself is unknown.
pub fn serialize_node(arena: &NodeArena, id: NodeId) -> Option<SerializedNode> {
    let node = arena.get(id)?;
    Some(SerializedNode {
        kind: node.kind(),
        props: serialize_props(node.id(), node.props(), node.text()),
        children: node
            .children()
            .iter()
            .filter_map(|child| serialize_node(arena, *child))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{EventHandler, Props};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn handler_flag_names_capitalize_first_letter() {
        assert_eq!(handler_flag_name("onPress"), "_hasOnPress");
        assert_eq!(handler_flag_name("onChange"), "_hasOnChange");
        assert_eq!(handler_flag_name("x"), "_hasX");
    }

    #[test]
    fn projection_strips_internal_and_callable_props() {
        let mut arena = NodeArena::new();
        let mut props = Props::new();
        props.insert("children".to_string(), PropValue::from("Save"));
        props.insert("key".to_string(), PropValue::from("k1"));
        props.insert("ref".to_string(), PropValue::Null);
        props.insert("marker".to_string(), PropValue::Symbol("wnk".to_string()));
        props.insert(
            "onPress".to_string(),
            PropValue::Handler(EventHandler::new(|_| Ok(()))),
        );
        props.insert("variant".to_string(), PropValue::from("primary"));
        props.insert("_nodeId".to_string(), PropValue::from("spoofed"));
        props.insert("value".to_string(), PropValue::from("spoofed"));
        props.insert("style".to_string(), PropValue::Json(json!({ "gap": 2 })));
        let button = arena.create(NodeKind::Button, props);
        arena.set_text(button, Some("Save".to_string()));

        let serialized = serialize_node(&arena, button).expect("serialize");

        assert_eq!(
            serde_json::to_value(&serialized).expect("json"),
            json!({
                "type": "Button",
                "props": {
                    "_hasOnPress": true,
                    "_nodeId": button.to_string(),
                    "style": { "gap": 2 },
                    "value": "Save",
                    "variant": "primary"
                },
                "children": []
            })
        );
    }

    #[test]
    fn projection_is_deterministic_and_recursive() {
        let mut arena = NodeArena::new();
        let root = arena.create(NodeKind::Box, Props::new());
        let text = arena.create(NodeKind::Text, Props::new());
        arena.set_text(text, Some("hello".to_string()));
        arena.append_child(root, text);

        let first = serialize_node(&arena, root).expect("first");
        let second = serialize_node(&arena, root).expect("second");

        assert_eq!(first, second);
        assert_eq!(first.children.len(), 1);
        assert_eq!(first.children[0].prop("value"), Some(&json!("hello")));
        assert_eq!(first.children[0].node_id(), Some(text.to_string().as_str()));
    }

    #[test]
    fn render_payload_keeps_null_root() {
        let payload = RenderPayload::new(None);
        assert_eq!(
            serde_json::to_string(&payload).expect("json"),
            r#"{"version":1,"root":null}"#
        );
    }
}
