use crate::serialize::{serialize_node, SerializedNode};
use crate::tree::{NodeArena, NodeId, NodeIdGen, NodeKind};
use crate::value::{EventHandler, Props};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootState {
    Empty,
    Single,
    Wrapped,
}

/// Top of the tree: owns the arena, the top-level node list and the
/// event-handler registry.
#[derive(Debug, Default)]
pub struct HostRoot {
    arena: NodeArena,
    top_level: Vec<NodeId>,
    wrapper: Option<NodeId>,
    child: Option<NodeId>,
    handlers: HashMap<NodeId, HashMap<String, EventHandler>>,
}

impl HostRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: NodeIdGen) -> Self {
        Self {
            arena: NodeArena::with_ids(ids),
            ..Self::default()
        }
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    /// The serialization target: the single top-level node or the wrapper.
    pub fn child(&self) -> Option<NodeId> {
        self.child
    }

    pub fn top_level(&self) -> &[NodeId] {
        &self.top_level
    }

    pub fn state(&self) -> RootState {
        match self.top_level.len() {
            0 => RootState::Empty,
            1 => RootState::Single,
            _ => RootState::Wrapped,
        }
    }

    /// Replaces the top level with `node`. Every previous top-level subtree
    /// other than `node` is released along with its handlers.
    pub fn set_child(&mut self, node: Option<NodeId>) {
        if let Some(node) = node {
            let parent = self.arena.get(node).and_then(|n| n.parent());
            if let Some(parent) = parent.filter(|p| Some(*p) != self.wrapper) {
                self.arena.remove_child(parent, node);
            }
        }
        let previous = std::mem::replace(&mut self.top_level, node.into_iter().collect());
        for old in previous.into_iter().filter(|old| Some(*old) != node) {
            self.arena.set_parent(old, None);
            self.release_subtree(old);
        }
        self.rebuild_container_root();
    }

    pub fn append_child_to_container(&mut self, child: NodeId) {
        self.top_level.retain(|id| *id != child);
        self.top_level.push(child);
        self.rebuild_container_root();
    }

    pub fn insert_child_in_container_before(&mut self, child: NodeId, before: NodeId) {
        self.top_level.retain(|id| *id != child);
        match self.top_level.iter().position(|id| *id == before) {
            Some(index) => self.top_level.insert(index, child),
            None => self.top_level.push(child),
        }
        self.rebuild_container_root();
    }

    /// Removes a top-level node, deregisters handlers for its whole subtree and
    /// frees it.
    pub fn remove_child_from_container(&mut self, child: NodeId) {
        let Some(index) = self.top_level.iter().position(|id| *id == child) else {
            return;
        };
        self.top_level.remove(index);
        self.arena.set_parent(child, None);
        self.release_subtree(child);
        self.rebuild_container_root();
    }

    pub fn clear_container(&mut self) {
        for child in std::mem::take(&mut self.top_level) {
            self.release_subtree(child);
        }
        self.rebuild_container_root();
    }

    /// Deregisters handlers below `id` (inclusive) and frees those nodes.
    pub fn release_subtree(&mut self, id: NodeId) {
        for freed in self.arena.remove_subtree(id) {
            self.handlers.remove(&freed);
        }
    }

    pub fn register_handler(&mut self, node: NodeId, event: &str, handler: EventHandler) {
        self.handlers
            .entry(node)
            .or_default()
            .insert(event.to_string(), handler);
    }

    pub fn unregister_handler(&mut self, node: NodeId, event: &str) {
        if let Some(events) = self.handlers.get_mut(&node) {
            events.remove(event);
            if events.is_empty() {
                self.handlers.remove(&node);
            }
        }
    }

    pub fn unregister_handlers(&mut self, node: NodeId) {
        self.handlers.remove(&node);
    }

    pub fn handler(&self, node: NodeId, event: &str) -> Option<EventHandler> {
        self.handlers.get(&node)?.get(event).cloned()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(HashMap::len).sum()
    }

    /// Invokes the handler synchronously. Returns `Ok(false)` when no handler
    /// is registered, which happens whenever a host event races a removal.
    ///
    /// Handlers that re-enter the root must go through [`HostRoot::handler`]
    /// instead, so no borrow is held while they run.
    pub fn dispatch_event(
        &self,
        node: NodeId,
        event: &str,
        payload: Option<&Value>,
    ) -> anyhow::Result<bool> {
        match self.handler(node, event) {
            Some(handler) => handler.call(payload).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn serialize(&self) -> Option<SerializedNode> {
        self.child.and_then(|id| serialize_node(&self.arena, id))
    }

    fn rebuild_container_root(&mut self) {
        match self.top_level.len() {
            0 => {
                self.dispose_wrapper();
                self.child = None;
            }
            1 => {
                self.dispose_wrapper();
                let only = self.top_level[0];
                self.arena.set_parent(only, None);
                self.child = Some(only);
            }
            _ => {
                let wrapper = match self.wrapper {
                    Some(id) if self.arena.contains(id) => id,
                    _ => {
                        let id = self.arena.create(NodeKind::Box, Props::new());
                        self.wrapper = Some(id);
                        id
                    }
                };
                for child in &self.top_level {
                    self.arena.set_parent(*child, Some(wrapper));
                }
                self.arena.set_children(wrapper, self.top_level.clone());
                self.child = Some(wrapper);
            }
        }
    }

    fn dispose_wrapper(&mut self) {
        if let Some(wrapper) = self.wrapper.take() {
            self.arena.release(wrapper);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropValue;
    use std::cell::Cell;
    use std::rc::Rc;

    fn create(root: &mut HostRoot, title: &str) -> NodeId {
        let mut props = Props::new();
        props.insert("title".to_string(), PropValue::from(title));
        root.arena_mut().create(NodeKind::Box, props)
    }

    #[test]
    fn empty_root_serializes_to_none() {
        let root = HostRoot::new();
        assert_eq!(root.state(), RootState::Empty);
        assert!(root.serialize().is_none());
    }

    #[test]
    fn single_child_serializes_without_wrapper() {
        let mut root = HostRoot::new();
        let a = create(&mut root, "a");
        root.append_child_to_container(a);

        let serialized = root.serialize().expect("serialized");
        assert_eq!(root.state(), RootState::Single);
        assert_eq!(serialized.node_id(), Some(a.to_string().as_str()));
        assert!(root.arena().get(a).is_some_and(|n| n.parent().is_none()));
    }

    #[test]
    fn multiple_children_are_wrapped_in_order_and_unwrapped_again() {
        let mut root = HostRoot::new();
        let a = create(&mut root, "a");
        let b = create(&mut root, "b");
        let c = create(&mut root, "c");
        root.append_child_to_container(a);
        root.append_child_to_container(c);
        root.insert_child_in_container_before(b, c);

        let wrapper = root.child().expect("wrapper");
        let serialized = root.serialize().expect("serialized");
        let titles: Vec<_> = serialized
            .children
            .iter()
            .filter_map(|n| n.prop("title").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(root.state(), RootState::Wrapped);
        assert_eq!(serialized.kind, NodeKind::Box);
        assert_eq!(titles, vec!["a", "b", "c"]);
        assert!(root.arena().get(b).is_some_and(|n| n.parent() == Some(wrapper)));

        root.remove_child_from_container(b);
        assert_eq!(root.child(), Some(wrapper));
        root.remove_child_from_container(a);

        assert_eq!(root.state(), RootState::Single);
        assert_eq!(root.child(), Some(c));
        assert!(!root.arena().contains(wrapper));
        assert!(root.arena().get(c).is_some_and(|n| n.parent().is_none()));
    }

    #[test]
    fn container_removal_deregisters_handlers_for_whole_subtree() {
        let mut root = HostRoot::new();
        let outer = create(&mut root, "outer");
        let inner = create(&mut root, "inner");
        root.arena_mut().append_child(outer, inner);
        root.append_child_to_container(outer);

        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        root.register_handler(
            inner,
            "onPress",
            EventHandler::new(move |_| {
                counter.set(counter.get() + 1);
                Ok(())
            }),
        );
        assert_eq!(root.dispatch_event(inner, "onPress", None).ok(), Some(true));

        root.remove_child_from_container(outer);

        assert_eq!(root.dispatch_event(inner, "onPress", None).ok(), Some(false));
        assert_eq!(calls.get(), 1);
        assert_eq!(root.handler_count(), 0);
        assert!(root.arena().is_empty());
    }

    #[test]
    fn dispatch_to_unknown_node_is_a_no_op() {
        let root = HostRoot::new();
        let ghost = "node_42".parse::<NodeId>().expect("id");
        assert_eq!(root.dispatch_event(ghost, "onChange", None).ok(), Some(false));
    }

    #[test]
    fn clear_container_drops_everything() {
        let mut root = HostRoot::new();
        let a = create(&mut root, "a");
        let b = create(&mut root, "b");
        root.append_child_to_container(a);
        root.append_child_to_container(b);
        root.register_handler(a, "onPress", EventHandler::new(|_| Ok(())));

        root.clear_container();

        assert_eq!(root.state(), RootState::Empty);
        assert!(root.serialize().is_none());
        assert_eq!(root.handler_count(), 0);
        assert!(root.arena().is_empty());
    }

    #[test]
    fn set_child_replaces_top_level() {
        let mut root = HostRoot::new();
        let a = create(&mut root, "a");
        let nested = create(&mut root, "nested");
        let b = create(&mut root, "b");
        root.arena_mut().append_child(a, nested);
        root.append_child_to_container(a);
        root.append_child_to_container(b);
        root.register_handler(nested, "onPress", EventHandler::new(|_| Ok(())));
        root.register_handler(b, "onPress", EventHandler::new(|_| Ok(())));
        let wrapper = root.child().expect("wrapper");

        root.set_child(Some(b));
        assert_eq!(root.top_level(), &[b]);
        assert_eq!(root.child(), Some(b));
        assert!(!root.arena().contains(a));
        assert!(!root.arena().contains(nested));
        assert!(!root.arena().contains(wrapper));
        assert!(root.arena().get(b).is_some_and(|n| n.parent().is_none()));
        assert_eq!(root.handler_count(), 1);
        assert_eq!(root.dispatch_event(nested, "onPress", None).ok(), Some(false));

        root.set_child(None);
        assert_eq!(root.state(), RootState::Empty);
        assert_eq!(root.handler_count(), 0);
        assert!(root.arena().is_empty());
    }
}
