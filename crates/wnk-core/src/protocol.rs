use crate::panel::{ActionItem, PanelBottom, PanelData, PanelNode, PanelTop};
use crate::serialize::RenderPayload;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_source: Option<String>,
}

impl HostContext {
    pub fn selection(&self) -> Option<&str> {
        self.selection_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPanel {
    #[default]
    Search,
    Details,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    Query {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<HostContext>,
    },
    #[serde(rename_all = "camelCase")]
    GetPanel { plugin_id: String, item_id: String },
    #[serde(rename_all = "camelCase")]
    GetSubpanel { plugin_id: String, item_id: String },
    #[serde(rename_all = "camelCase")]
    GetActions {
        /// Echoed back verbatim; any JSON number is accepted.
        token: Number,
        #[serde(default)]
        panel: ActionPanel,
        plugin_id: String,
        item_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    Command {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl InboundMessage {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::GetPanel { .. } => "getPanel",
            Self::GetSubpanel { .. } => "getSubpanel",
            Self::GetActions { .. } => "getActions",
            Self::Command { .. } => "command",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostEventKind {
    Press,
    Change,
    Keydown,
    Focus,
    Blur,
    #[serde(other)]
    Unknown,
}

/// Direct host-to-tree event, addressed by serialized node id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEvent {
    #[serde(rename = "type")]
    pub kind: HostEventKind,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    Message(InboundMessage),
    HostEvent(HostEvent),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed line: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unrecognized message shape")]
    Unrecognized,
}

/// Parses one input line. Anything that is valid JSON but not a known
/// request is tried as a host event.
pub fn parse_line(line: &str) -> Result<Incoming, ProtocolError> {
    let value: Value = serde_json::from_str(line.trim())?;
    if let Ok(message) = InboundMessage::deserialize(&value) {
        return Ok(Incoming::Message(message));
    }
    HostEvent::deserialize(&value)
        .map(Incoming::HostEvent)
        .map_err(|_| ProtocolError::Unrecognized)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ResultItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResultItem {
    pub plugin_id: String,
    #[serde(flatten)]
    pub item: ResultItem,
}

/// Everything a plugin's action provider gets to see.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionContext {
    pub panel: ActionPanel,
    pub plugin_id: String,
    pub item_id: String,
    pub selected_id: Option<String>,
    pub selected_text: Option<String>,
    pub query: Option<String>,
    pub host_context: Option<HostContext>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    Results {
        items: Vec<PluginResultItem>,
    },
    #[serde(rename_all = "camelCase")]
    Panel {
        plugin_id: String,
        top: PanelTop,
        main: PanelNode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bottom: Option<PanelBottom>,
    },
    #[serde(rename_all = "camelCase")]
    Subpanel {
        plugin_id: String,
        top: PanelTop,
        main: PanelNode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bottom: Option<PanelBottom>,
    },
    #[serde(rename_all = "camelCase")]
    Actions {
        token: Number,
        plugin_id: String,
        items: Vec<ActionItem>,
    },
    Effect {
        name: String,
        text: String,
    },
}

impl OutboundMessage {
    pub fn panel(plugin_id: impl Into<String>, panel: PanelData) -> Self {
        Self::Panel {
            plugin_id: plugin_id.into(),
            top: panel.top,
            main: panel.main,
            bottom: panel.bottom,
        }
    }

    pub fn subpanel(plugin_id: impl Into<String>, panel: PanelData) -> Self {
        Self::Subpanel {
            plugin_id: plugin_id.into(),
            top: panel.top,
            main: panel.main,
            bottom: panel.bottom,
        }
    }
}

/// One line on the output channel.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputLine {
    Message(OutboundMessage),
    Render(RenderPayload),
}

impl From<OutboundMessage> for OutputLine {
    fn from(value: OutboundMessage) -> Self {
        Self::Message(value)
    }
}

impl From<RenderPayload> for OutputLine {
    fn from(value: RenderPayload) -> Self {
        Self::Render(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn query_with_and_without_context() {
        let parsed = parse_line(r#"{"type":"query","text":"2+2"}"#).expect("parse");
        assert_eq!(
            parsed,
            Incoming::Message(InboundMessage::Query {
                text: "2+2".to_string(),
                context: None,
            })
        );

        let parsed = parse_line(
            r#"{"type":"query","text":"","context":{"selectionText":"a b","selectionSource":"clipboard"}}"#,
        )
        .expect("parse");
        match parsed {
            Incoming::Message(InboundMessage::Query { context: Some(ctx), .. }) => {
                assert_eq!(ctx.selection(), Some("a b"));
                assert_eq!(ctx.selection_source.as_deref(), Some("clipboard"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn get_actions_defaults_panel_to_search() {
        let parsed = parse_line(r#"{"type":"getActions","token":7,"pluginId":"todo","itemId":"list"}"#)
            .expect("parse");
        match parsed {
            Incoming::Message(InboundMessage::GetActions {
                token,
                panel,
                selected_id,
                ..
            }) => {
                assert_eq!(token, Number::from(7));
                assert_eq!(panel, ActionPanel::Search);
                assert!(selected_id.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn get_subpanel_is_a_distinct_request() {
        let parsed = parse_line(r#"{"type":"getSubpanel","pluginId":"w","itemId":"x"}"#).expect("parse");
        match parsed {
            Incoming::Message(message) => assert_eq!(message.as_tag(), "getSubpanel"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_types_fall_through_to_host_events() {
        let parsed = parse_line(r#"{"type":"press","targetId":"node_3"}"#).expect("parse");
        assert_eq!(
            parsed,
            Incoming::HostEvent(HostEvent {
                kind: HostEventKind::Press,
                target_id: Some("node_3".to_string()),
                payload: None,
            })
        );

        let parsed = parse_line(r#"{"type":"scroll","targetId":"node_3"}"#).expect("parse");
        assert!(matches!(
            parsed,
            Incoming::HostEvent(HostEvent {
                kind: HostEventKind::Unknown,
                ..
            })
        ));
    }

    #[test]
    fn malformed_and_shapeless_lines_are_errors() {
        assert!(matches!(parse_line("{not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(parse_line("[1,2]"), Err(ProtocolError::Unrecognized)));
        assert!(matches!(parse_line(r#"{"text":"x"}"#), Err(ProtocolError::Unrecognized)));
    }

    #[test]
    fn results_line_matches_wire_shape() {
        let line = OutputLine::from(OutboundMessage::Results {
            items: vec![PluginResultItem {
                plugin_id: "calculator".to_string(),
                item: ResultItem::new("4").subtitle("2+2 = 4").icon("="),
            }],
        });
        assert_eq!(
            serde_json::to_string(&line).expect("json"),
            r#"{"type":"results","items":[{"pluginId":"calculator","title":"4","subtitle":"2+2 = 4","icon":"="}]}"#
        );
    }

    #[test]
    fn panel_and_actions_lines_match_wire_shape() {
        let panel = PanelData {
            top: PanelTop::header("Todo", None),
            main: PanelNode::empty(),
            bottom: Some(PanelBottom::None),
        };
        assert_eq!(
            serde_json::to_value(OutboundMessage::subpanel("todo", panel)).expect("json"),
            json!({
                "type": "subpanel",
                "pluginId": "todo",
                "top": { "type": "header", "title": "Todo" },
                "main": { "type": "flex", "items": [] },
                "bottom": { "type": "none" }
            })
        );

        let actions = OutboundMessage::Actions {
            token: Number::from(3),
            plugin_id: "todo".to_string(),
            items: vec![ActionItem::new("todo.toggle", "Toggle")],
        };
        assert_eq!(
            serde_json::to_value(actions).expect("json"),
            json!({
                "type": "actions",
                "token": 3,
                "pluginId": "todo",
                "items": [{ "name": "todo.toggle", "title": "Toggle" }]
            })
        );
    }

    #[test]
    fn effect_line_matches_wire_shape() {
        let effect = OutboundMessage::Effect {
            name: "setSearchText".to_string(),
            text: "todo ".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&OutputLine::from(effect)).expect("json"),
            r#"{"type":"effect","name":"setSearchText","text":"todo "}"#
        );
    }
}
