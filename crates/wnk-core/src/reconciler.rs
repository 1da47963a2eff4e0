use crate::root::HostRoot;
use crate::tree::{NodeId, NodeKind};
use crate::value::{Props, PropValue, EVENT_PROPS};
use std::collections::BTreeMap;
use tracing::debug;

/// Changed keys map to their new value; `None` unsets the key.
pub type PropPatch = BTreeMap<String, Option<PropValue>>;

/// Mutation contract a declarative renderer drives. Mirrors the host config of
/// a mutation-mode reconciler: no persistence, no hydration.
pub trait HostConfig {
    const SUPPORTS_MUTATION: bool = true;
    const SUPPORTS_PERSISTENCE: bool = false;
    const SUPPORTS_HYDRATION: bool = false;

    fn create_instance(&mut self, tag: &str, props: &Props) -> NodeId;
    fn create_text_instance(&mut self, text: &str) -> NodeId;

    fn append_initial_child(&mut self, parent: NodeId, child: NodeId);
    fn append_child(&mut self, parent: NodeId, child: NodeId);
    fn insert_before(&mut self, parent: NodeId, child: NodeId, before: NodeId);
    fn remove_child(&mut self, parent: NodeId, child: NodeId);

    fn append_child_to_container(&mut self, child: NodeId);
    fn insert_in_container_before(&mut self, child: NodeId, before: NodeId);
    fn remove_child_from_container(&mut self, child: NodeId);
    fn clear_container(&mut self);

    fn prepare_update(&self, _instance: NodeId, _tag: &str, old: &Props, new: &Props) -> Option<PropPatch> {
        diff_props(old, new)
    }

    fn commit_update(&mut self, instance: NodeId, patch: &PropPatch, new_props: &Props);
    fn commit_text_update(&mut self, instance: NodeId, old_text: &str, new_text: &str);

    fn should_set_text_content(&self, _tag: &str, props: &Props) -> bool {
        inline_text(props).is_some()
    }

    fn finalize_initial_children(&mut self, _instance: NodeId, _tag: &str, _props: &Props) -> bool {
        false
    }

    fn prepare_for_commit(&mut self) {}
    fn reset_after_commit(&mut self);

    /// Called for each deleted subtree root below the container level, after
    /// it has been detached from its parent.
    fn detach_deleted_instance(&mut self, _instance: NodeId) {}

    fn prepare_portal_mount(&mut self, _instance: NodeId) {}
    fn prepare_scope_update(&mut self, _scope: NodeId, _instance: NodeId) {}
    fn before_active_instance_blur(&mut self) {}
    fn after_active_instance_blur(&mut self) {}
    fn get_instance_from_scope(&self, _scope: NodeId) -> Option<NodeId> {
        None
    }
}

/// Inline text carried by a primitive `children` prop.
pub fn inline_text(props: &Props) -> Option<String> {
    props.get("children").and_then(PropValue::as_text)
}

fn children_changed(old: Option<&PropValue>, new: Option<&PropValue>) -> bool {
    let old_text = old.is_some_and(PropValue::is_text);
    let new_text = new.is_some_and(PropValue::is_text);
    (old_text || new_text) && old != new
}

/// Minimal patch between two prop maps, or `None` when nothing changed.
pub fn diff_props(old: &Props, new: &Props) -> Option<PropPatch> {
    let mut patch = PropPatch::new();

    for (key, value) in new {
        if key == "children" {
            continue;
        }
        if old.get(key) != Some(value) {
            patch.insert(key.clone(), Some(value.clone()));
        }
    }
    for key in old.keys() {
        if key != "children" && !new.contains_key(key) {
            patch.insert(key.clone(), None);
        }
    }

    let (old_children, new_children) = (old.get("children"), new.get("children"));
    if children_changed(old_children, new_children) {
        patch.insert("children".to_string(), new_children.cloned());
    }

    (!patch.is_empty()).then_some(patch)
}

type CommitCallback = Box<dyn FnMut(&HostRoot)>;

/// The host side of the contract: mutates a [`HostRoot`] and reports every
/// commit point to an optional callback.
pub struct WnkHost {
    root: HostRoot,
    on_commit: Option<CommitCallback>,
}

impl WnkHost {
    pub fn new(root: HostRoot) -> Self {
        Self {
            root,
            on_commit: None,
        }
    }

    pub fn with_commit_callback(root: HostRoot, callback: impl FnMut(&HostRoot) + 'static) -> Self {
        Self {
            root,
            on_commit: Some(Box::new(callback)),
        }
    }

    pub fn set_commit_callback(&mut self, callback: impl FnMut(&HostRoot) + 'static) {
        self.on_commit = Some(Box::new(callback));
    }

    pub fn root(&self) -> &HostRoot {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut HostRoot {
        &mut self.root
    }

    fn notify(&mut self) {
        if let Some(callback) = self.on_commit.as_mut() {
            callback(&self.root);
        }
    }

    fn register_event_props(&mut self, id: NodeId, props: &Props) {
        for event in EVENT_PROPS {
            if let Some(handler) = props.get(event).and_then(PropValue::as_handler) {
                self.root.register_handler(id, event, handler.clone());
            }
        }
    }
}

impl std::fmt::Debug for WnkHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WnkHost")
            .field("root", &self.root)
            .field("on_commit", &self.on_commit.is_some())
            .finish()
    }
}

impl HostConfig for WnkHost {
    fn create_instance(&mut self, tag: &str, props: &Props) -> NodeId {
        let id = self
            .root
            .arena_mut()
            .create(NodeKind::from_tag(tag), props.clone());
        if let Some(text) = inline_text(props) {
            self.root.arena_mut().set_text(id, Some(text));
        }
        self.register_event_props(id, props);
        id
    }

    fn create_text_instance(&mut self, text: &str) -> NodeId {
        let arena = self.root.arena_mut();
        let id = arena.create(NodeKind::Text, Props::new());
        arena.set_text(id, Some(text.to_string()));
        id
    }

    fn append_initial_child(&mut self, parent: NodeId, child: NodeId) {
        self.root.arena_mut().append_child(parent, child);
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.root.arena_mut().append_child(parent, child);
    }

    fn insert_before(&mut self, parent: NodeId, child: NodeId, before: NodeId) {
        self.root.arena_mut().insert_before(parent, child, before);
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.root.arena_mut().remove_child(parent, child);
    }

    fn append_child_to_container(&mut self, child: NodeId) {
        self.root.append_child_to_container(child);
        self.notify();
    }

    fn insert_in_container_before(&mut self, child: NodeId, before: NodeId) {
        self.root.insert_child_in_container_before(child, before);
        self.notify();
    }

    fn remove_child_from_container(&mut self, child: NodeId) {
        self.root.remove_child_from_container(child);
        self.notify();
    }

    fn clear_container(&mut self) {
        self.root.clear_container();
    }

    fn commit_update(&mut self, instance: NodeId, patch: &PropPatch, new_props: &Props) {
        self.root.arena_mut().update_props(instance, patch);
        let text = inline_text(new_props);
        self.root.arena_mut().set_text(instance, text);

        for event in EVENT_PROPS {
            match patch.get(event) {
                Some(Some(PropValue::Handler(handler))) => {
                    self.root.register_handler(instance, event, handler.clone());
                }
                Some(_) => self.root.unregister_handler(instance, event),
                None => {}
            }
        }
    }

    fn commit_text_update(&mut self, instance: NodeId, _old_text: &str, new_text: &str) {
        self.root
            .arena_mut()
            .set_text(instance, Some(new_text.to_string()));
    }

    fn reset_after_commit(&mut self) {
        self.notify();
    }

    fn detach_deleted_instance(&mut self, instance: NodeId) {
        debug!(node = %instance, "releasing deleted subtree");
        self.root.release_subtree(instance);
    }
}
