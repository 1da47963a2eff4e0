use crate::reconciler::PropPatch;
use crate::value::Props;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = ();

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input
            .trim()
            .strip_prefix("node_")
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Self)
            .ok_or(())
    }
}

/// Shared monotonic id source. Every arena created from the same generator
/// hands out ids that are never reused.
#[derive(Clone, Debug, Default)]
pub struct NodeIdGen(Rc<Cell<u64>>);

impl NodeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> NodeId {
        let next = self.0.get().saturating_add(1);
        self.0.set(next);
        NodeId(next)
    }

    pub fn issued(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Box,
    Text,
    Button,
    Input,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Box => "Box",
            Self::Text => "Text",
            Self::Button => "Button",
            Self::Input => "Input",
        }
    }

    /// Maps an element tag to a node kind. Unknown tags become boxes.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "wnk-box" | "wink-box" => Self::Box,
            "wnk-text" | "wink-text" => Self::Text,
            "wnk-button" | "wink-button" => Self::Button,
            "wnk-input" | "wink-input" => Self::Input,
            _ => Self::Box,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    props: Props,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    text: Option<String>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// Owns every node. Children vectors are the only owning edges; parents are
/// stored by id.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: HashMap<NodeId, Node>,
    ids: NodeIdGen,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: NodeIdGen) -> Self {
        Self {
            nodes: HashMap::new(),
            ids,
        }
    }

    pub fn ids(&self) -> &NodeIdGen {
        &self.ids
    }

    pub fn create(&mut self, kind: NodeKind, props: Props) -> NodeId {
        let id = self.ids.next_id();
        self.nodes.insert(
            id,
            Node {
                id,
                kind,
                props,
                children: Vec::new(),
                parent: None,
                text: None,
            },
        );
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reparents `child` and appends it. There is no duplicate check.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.nodes.contains_key(&parent) || !self.nodes.contains_key(&child) {
            return;
        }
        self.set_parent(child, Some(parent));
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    /// Reparents `child` and inserts it at the position of `before`, or
    /// appends when `before` is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, before: NodeId) {
        if !self.nodes.contains_key(&parent) || !self.nodes.contains_key(&child) {
            return;
        }
        self.set_parent(child, Some(parent));
        if let Some(node) = self.nodes.get_mut(&parent) {
            match node.children.iter().position(|c| *c == before) {
                Some(index) => node.children.insert(index, child),
                None => node.children.push(child),
            }
        }
    }

    /// Removes `child` by identity; a no-op when it is not listed.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        let removed = match self.nodes.get_mut(&parent) {
            Some(node) => match node.children.iter().position(|c| *c == child) {
                Some(index) => {
                    node.children.remove(index);
                    true
                }
                None => false,
            },
            None => false,
        };
        if removed {
            self.set_parent(child, None);
        }
    }

    /// Shallow merge. `None` entries unset the key.
    pub fn update_props(&mut self, id: NodeId, patch: &PropPatch) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        for (key, value) in patch {
            match value {
                Some(value) => {
                    node.props.insert(key.clone(), value.clone());
                }
                None => {
                    node.props.remove(key);
                }
            }
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: Option<String>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.text = text;
        }
    }

    pub(crate) fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }
    }

    pub(crate) fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = children;
        }
    }

    /// Ids of `id` and all of its descendants, parents before children.
    pub fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get(&next) else {
                continue;
            };
            out.push(next);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Drops a single node without touching its children.
    pub(crate) fn release(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    /// Drops `id` and everything below it, returning the freed ids.
    pub fn remove_subtree(&mut self, id: NodeId) -> Vec<NodeId> {
        let ids = self.subtree_ids(id);
        for freed in &ids {
            self.nodes.remove(freed);
        }
        ids
    }
}
