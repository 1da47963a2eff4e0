use crate::element::Element;
use crate::render::render_once;
use crate::serialize::SerializedNode;
use crate::tree::{NodeIdGen, NodeKind};
use crate::value::serialize_opt_number;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_actions: Option<bool>,
}

impl PanelItem {
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            subtitle: subtitle.into(),
            has_actions: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_on_execute: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ActionInput>,
}

impl ActionItem {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PanelTop {
    Header {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtitle: Option<String>,
    },
    Selected,
}

impl PanelTop {
    pub fn header(title: impl Into<String>, subtitle: Option<String>) -> Self {
        Self::Header {
            title: title.into(),
            subtitle: subtitle.filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PanelBottom {
    None,
    Info { text: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Vertical,
    Horizontal,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", from = "RawPanelNode")]
pub enum PanelNode {
    Flex {
        items: Vec<PanelItem>,
    },
    Grid {
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_opt_number")]
        columns: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_opt_number")]
        gap: Option<f64>,
        items: Vec<PanelItem>,
    },
    Box {
        #[serde(skip_serializing_if = "Option::is_none")]
        dir: Option<Direction>,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_opt_number")]
        gap: Option<f64>,
        children: Vec<PanelNode>,
    },
}

impl PanelNode {
    pub fn empty() -> Self {
        Self::Flex { items: Vec::new() }
    }
}

/// Input shape: also accepts `box{layout?, items}` from older plugins.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawPanelNode {
    Flex {
        #[serde(default)]
        items: Vec<PanelItem>,
    },
    Grid {
        #[serde(default)]
        columns: Option<f64>,
        #[serde(default)]
        gap: Option<f64>,
        #[serde(default)]
        items: Vec<PanelItem>,
    },
    Box {
        #[serde(default)]
        layout: Option<String>,
        #[serde(default)]
        dir: Option<Direction>,
        #[serde(default)]
        gap: Option<f64>,
        #[serde(default)]
        columns: Option<f64>,
        #[serde(default)]
        items: Option<Vec<PanelItem>>,
        #[serde(default)]
        children: Vec<PanelNode>,
    },
}

impl From<RawPanelNode> for PanelNode {
    fn from(raw: RawPanelNode) -> Self {
        match raw {
            RawPanelNode::Flex { items } => Self::Flex { items },
            RawPanelNode::Grid {
                columns,
                gap,
                items,
            } => Self::Grid {
                columns,
                gap,
                items,
            },
            RawPanelNode::Box {
                layout,
                dir,
                gap,
                columns,
                items: Some(items),
                children,
            } if children.is_empty() => match layout.as_deref() {
                Some("grid") => Self::Grid {
                    columns,
                    gap,
                    items,
                },
                _ if dir.is_none() && gap.is_none() => Self::Flex { items },
                _ => Self::Box {
                    dir,
                    gap,
                    children: vec![Self::Flex { items }],
                },
            },
            RawPanelNode::Box {
                dir, gap, children, ..
            } => Self::Box { dir, gap, children },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PanelData {
    pub top: PanelTop,
    pub main: PanelNode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<PanelBottom>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedPanel {
    pub panel: PanelData,
    pub actions: Vec<ActionItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PanelDefaults {
    pub title: String,
    pub subtitle: Option<String>,
}

impl PanelDefaults {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
        }
    }

    fn top(&self) -> PanelTop {
        PanelTop::header(self.title.clone(), self.subtitle.clone())
    }
}

/// Default panel: fallback header, empty flex main, no footer.
pub fn default_panel(defaults: &PanelDefaults) -> RenderedPanel {
    RenderedPanel {
        panel: PanelData {
            top: defaults.top(),
            main: PanelNode::empty(),
            bottom: Some(PanelBottom::None),
        },
        actions: Vec::new(),
    }
}

/// What a plugin may hand back from a panel or command call.
#[derive(Clone, Debug)]
pub enum PanelOutput {
    Data(PanelData),
    Element(Element),
    /// Untyped JSON: panel data, optionally with an `actions` list, or a
    /// serialized tree.
    Raw(Value),
}

impl From<PanelData> for PanelOutput {
    fn from(value: PanelData) -> Self {
        Self::Data(value)
    }
}

impl From<Element> for PanelOutput {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

#[derive(Deserialize)]
struct PanelEnvelope {
    #[serde(flatten)]
    panel: PanelData,
    #[serde(default)]
    actions: Option<Value>,
}

pub fn normalize_output(output: PanelOutput, defaults: &PanelDefaults, ids: &NodeIdGen) -> RenderedPanel {
    match output {
        PanelOutput::Data(panel) => RenderedPanel {
            panel,
            actions: Vec::new(),
        },
        PanelOutput::Element(element) => {
            let root = render_once(&element, ids);
            panel_from_serialized_root(root.as_ref(), defaults)
        }
        PanelOutput::Raw(value) => {
            if let Ok(envelope) = serde_json::from_value::<PanelEnvelope>(value.clone()) {
                return RenderedPanel {
                    panel: envelope.panel,
                    actions: parse_actions(envelope.actions.as_ref()).unwrap_or_default(),
                };
            }
            match serde_json::from_value::<SerializedNode>(value) {
                Ok(root) => panel_from_serialized_root(Some(&root), defaults),
                Err(_) => default_panel(defaults),
            }
        }
    }
}

/// Builds canonical panel data from a serialized tree. Reserved root props
/// (`top`, `bottom`, `actions`) win over the flat `title`/`subtitle`/`bottomInfo`
/// props older plugins set.
pub fn panel_from_serialized_root(root: Option<&SerializedNode>, defaults: &PanelDefaults) -> RenderedPanel {
    let Some(root) = root.filter(|root| root.kind == NodeKind::Box) else {
        return default_panel(defaults);
    };
    let props = &root.props;

    let top = parse_top(props.get("top"))
        .or_else(|| {
            non_empty_str(props.get("title")).map(|title| {
                PanelTop::header(title, non_empty_str(props.get("subtitle")).map(str::to_string))
            })
        })
        .unwrap_or_else(|| defaults.top());

    let bottom = parse_bottom(props.get("bottom"))
        .or_else(|| {
            as_str(props.get("bottomInfo")).filter(|s| !s.is_empty()).map(|text| PanelBottom::Info {
                text: text.to_string(),
            })
        })
        .unwrap_or(PanelBottom::None);

    let actions = parse_actions(props.get("actions")).unwrap_or_default();
    let main = to_panel_node(root).unwrap_or_else(PanelNode::empty);

    RenderedPanel {
        panel: PanelData {
            top,
            main,
            bottom: Some(bottom),
        },
        actions,
    }
}

fn as_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    as_str(value).filter(|s| !s.is_empty())
}

fn as_number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|n| n.is_finite())
}

fn as_bool(value: Option<&Value>) -> Option<bool> {
    value.and_then(Value::as_bool)
}

fn parse_top(value: Option<&Value>) -> Option<PanelTop> {
    let object = value?.as_object()?;
    match as_str(object.get("type"))? {
        "selected" => Some(PanelTop::Selected),
        "header" => {
            let title = non_empty_str(object.get("title"))?;
            Some(PanelTop::header(
                title,
                non_empty_str(object.get("subtitle")).map(str::to_string),
            ))
        }
        _ => None,
    }
}

fn parse_bottom(value: Option<&Value>) -> Option<PanelBottom> {
    let object = value?.as_object()?;
    match as_str(object.get("type"))? {
        "none" => Some(PanelBottom::None),
        "info" => Some(PanelBottom::Info {
            text: as_str(object.get("text"))?.to_string(),
        }),
        _ => None,
    }
}

fn parse_action_input(value: Option<&Value>) -> Option<ActionInput> {
    let object = value?.as_object()?;
    Some(ActionInput {
        placeholder: as_str(object.get("placeholder")).map(str::to_string),
        initial: as_str(object.get("initial")).map(str::to_string),
    })
}

/// Field-by-field validation; malformed entries are dropped.
pub fn parse_actions(value: Option<&Value>) -> Option<Vec<ActionItem>> {
    let entries = value?.as_array()?;
    let actions = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|object| {
            Some(ActionItem {
                name: non_empty_str(object.get("name"))?.to_string(),
                title: non_empty_str(object.get("title"))?.to_string(),
                text: as_str(object.get("text")).map(str::to_string),
                close_on_execute: as_bool(object.get("close_on_execute")),
                host_only: as_bool(object.get("host_only")),
                input: parse_action_input(object.get("input")),
            })
        })
        .collect();
    Some(actions)
}

fn try_parse_item(node: &SerializedNode) -> Option<PanelItem> {
    if node.kind != NodeKind::Box || !node.children.is_empty() {
        return None;
    }
    let props = &node.props;
    Some(PanelItem {
        id: non_empty_str(props.get("id")).map(str::to_string),
        title: non_empty_str(props.get("title"))?.to_string(),
        subtitle: as_str(props.get("subtitle")).unwrap_or_default().to_string(),
        has_actions: as_bool(props.get("has_actions")),
    })
}

fn style(props: &Map<String, Value>) -> Option<&Map<String, Value>> {
    props.get("style").and_then(Value::as_object)
}

fn read_layout(props: &Map<String, Value>) -> Option<&str> {
    as_str(props.get("layout")).or_else(|| style(props).and_then(|s| as_str(s.get("display"))))
}

fn read_grid_gap(style: Option<&Map<String, Value>>) -> Option<f64> {
    let style = style?;
    as_number(style.get("gridColumnGap"))
        .or_else(|| as_number(style.get("gridRowGap")))
        .or_else(|| as_number(style.get("gap")))
}

fn read_gap(props: &Map<String, Value>) -> Option<f64> {
    as_number(props.get("gap")).or_else(|| read_grid_gap(style(props)))
}

fn read_dir(props: &Map<String, Value>) -> Option<Direction> {
    match as_str(props.get("dir")) {
        Some("vertical") => return Some(Direction::Vertical),
        Some("horizontal") => return Some(Direction::Horizontal),
        _ => {}
    }
    match style(props).and_then(|s| as_str(s.get("flexDirection"))) {
        Some("row") => Some(Direction::Horizontal),
        Some("column") => Some(Direction::Vertical),
        _ => None,
    }
}

fn to_panel_node(node: &SerializedNode) -> Option<PanelNode> {
    if node.kind != NodeKind::Box {
        return None;
    }
    let props = &node.props;

    let leaves: Option<Vec<PanelItem>> = if node.children.is_empty() {
        None
    } else {
        node.children.iter().map(try_parse_item).collect()
    };

    if let Some(items) = leaves {
        if read_layout(props) == Some("grid") {
            return Some(PanelNode::Grid {
                columns: as_number(props.get("columns"))
                    .or_else(|| style(props).and_then(|s| as_number(s.get("gridColumns")))),
                gap: read_gap(props),
                items,
            });
        }
        return Some(PanelNode::Flex { items });
    }

    let mut children = Vec::new();
    let mut pending: Vec<PanelItem> = Vec::new();
    for child in &node.children {
        if let Some(item) = try_parse_item(child) {
            pending.push(item);
            continue;
        }
        if !pending.is_empty() {
            children.push(PanelNode::Flex {
                items: std::mem::take(&mut pending),
            });
        }
        if let Some(converted) = to_panel_node(child) {
            children.push(converted);
        }
    }
    if !pending.is_empty() {
        children.push(PanelNode::Flex { items: pending });
    }

    Some(PanelNode::Box {
        dir: read_dir(props),
        gap: read_gap(props),
        children,
    })
}
