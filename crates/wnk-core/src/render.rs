use crate::element::Element;
use crate::reconciler::{HostConfig, WnkHost};
use crate::root::HostRoot;
use crate::serialize::SerializedNode;
use crate::tree::{NodeId, NodeIdGen};
use crate::value::Props;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// What the renderer last committed for one element.
#[derive(Debug)]
struct Mounted {
    id: NodeId,
    tag: String,
    key: Option<String>,
    props: Props,
    children: Vec<Mounted>,
}

#[derive(Clone, Copy, Debug)]
enum Parent {
    Container,
    Node(NodeId),
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum SlotKey {
    Keyed(String),
    Index(usize),
}

impl SlotKey {
    fn of(key: Option<&String>, index: usize) -> Self {
        match key {
            Some(key) => Self::Keyed(key.clone()),
            None => Self::Index(index),
        }
    }
}

/// Keyed immediate-mode renderer. Each call diffs the new element list
/// against the last committed one and drives `H` with the minimal mutations.
#[derive(Debug)]
pub struct Renderer<H: HostConfig> {
    host: H,
    mounted: Vec<Mounted>,
}

impl<H: HostConfig> Renderer<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            mounted: Vec::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn is_mounted(&self) -> bool {
        !self.mounted.is_empty()
    }

    pub fn render(&mut self, element: &Element) {
        self.render_all(std::slice::from_ref(element));
    }

    /// Renders a fragment: every element becomes a top-level node.
    pub fn render_all(&mut self, elements: &[Element]) {
        self.host.prepare_for_commit();
        let previous = std::mem::take(&mut self.mounted);
        self.mounted = reconcile_children(&mut self.host, Parent::Container, previous, elements);
        self.host.reset_after_commit();
    }

    pub fn unmount(&mut self) {
        self.render_all(&[]);
    }
}

fn mount<H: HostConfig>(host: &mut H, element: &Element) -> Mounted {
    let id = if element.is_text() {
        host.create_text_instance(&element.text_content())
    } else {
        host.create_instance(&element.tag, &element.props)
    };

    let mut children = Vec::with_capacity(element.children.len());
    for child in &element.children {
        let mounted = mount(host, child);
        host.append_initial_child(id, mounted.id);
        children.push(mounted);
    }
    host.finalize_initial_children(id, &element.tag, &element.props);

    Mounted {
        id,
        tag: element.tag.clone(),
        key: element.key.clone(),
        props: element.props.clone(),
        children,
    }
}

fn update<H: HostConfig>(host: &mut H, mut current: Mounted, element: &Element) -> Mounted {
    if element.is_text() {
        let (old, new) = (current_text(&current.props), element.text_content());
        if old != new {
            host.commit_text_update(current.id, &old, &new);
        }
    } else if let Some(patch) = host.prepare_update(current.id, &element.tag, &current.props, &element.props) {
        host.commit_update(current.id, &patch, &element.props);
    }

    let previous = std::mem::take(&mut current.children);
    current.children = reconcile_children(host, Parent::Node(current.id), previous, &element.children);
    current.props = element.props.clone();
    current.key = element.key.clone();
    current
}

fn current_text(props: &Props) -> String {
    crate::reconciler::inline_text(props).unwrap_or_default()
}

fn delete<H: HostConfig>(host: &mut H, parent: Parent, mounted: Mounted) {
    match parent {
        Parent::Container => host.remove_child_from_container(mounted.id),
        Parent::Node(parent) => {
            host.remove_child(parent, mounted.id);
            host.detach_deleted_instance(mounted.id);
        }
    }
}

fn place<H: HostConfig>(host: &mut H, parent: Parent, child: NodeId, before: Option<NodeId>, moved: bool) {
    match (parent, before) {
        (Parent::Container, Some(before)) => host.insert_in_container_before(child, before),
        (Parent::Container, None) => host.append_child_to_container(child),
        (Parent::Node(parent), before) => {
            if moved {
                host.remove_child(parent, child);
            }
            match before {
                Some(before) => host.insert_before(parent, child, before),
                None => host.append_child(parent, child),
            }
        }
    }
}

/// Matches children by key (or position when unkeyed) and tag, deletes the
/// leftovers, updates the survivors and places new or moved nodes before
/// their next stable sibling.
fn reconcile_children<H: HostConfig>(
    host: &mut H,
    parent: Parent,
    previous: Vec<Mounted>,
    elements: &[Element],
) -> Vec<Mounted> {
    // The first sibling with a given key keeps the slot; later duplicates are
    // deleted so none of them lingers in the tree.
    let mut slots: HashMap<SlotKey, (usize, Mounted)> = HashMap::with_capacity(previous.len());
    for (index, mounted) in previous.into_iter().enumerate() {
        match slots.entry(SlotKey::of(mounted.key.as_ref(), index)) {
            Entry::Occupied(_) => delete(host, parent, mounted),
            Entry::Vacant(slot) => {
                slot.insert((index, mounted));
            }
        }
    }

    let mut matched: Vec<Option<(usize, Mounted)>> = elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let key = SlotKey::of(element.key.as_ref(), index);
            match slots.remove(&key) {
                Some((old_index, mounted)) if mounted.tag == element.tag => Some((old_index, mounted)),
                Some(stale) => {
                    slots.insert(key, stale);
                    None
                }
                None => None,
            }
        })
        .collect();

    for (_, (_, stale)) in slots.drain() {
        delete(host, parent, stale);
    }

    // Survivors keep their relative order as long as their old index grows.
    let mut last_placed = 0;
    let mut placements = Vec::with_capacity(elements.len());
    let mut children = Vec::with_capacity(elements.len());
    for (element, slot) in elements.iter().zip(matched.iter_mut()) {
        match slot.take() {
            Some((old_index, mounted)) => {
                let mounted = update(host, mounted, element);
                if old_index >= last_placed {
                    last_placed = old_index;
                    placements.push(None);
                } else {
                    placements.push(Some(true));
                }
                children.push(mounted);
            }
            None => {
                placements.push(Some(false));
                children.push(mount(host, element));
            }
        }
    }

    for index in 0..children.len() {
        let Some(moved) = placements[index] else {
            continue;
        };
        let before = (index + 1..children.len())
            .find(|later| placements[*later].is_none())
            .map(|later| children[later].id);
        place(host, parent, children[index].id, before, moved);
    }

    children
}

/// Renders `element` into a throwaway root, snapshots it and tears it down.
pub fn render_once(element: &Element, ids: &NodeIdGen) -> Option<SerializedNode> {
    let mut renderer = Renderer::new(WnkHost::new(HostRoot::with_ids(ids.clone())));
    renderer.render(element);
    let snapshot = renderer.host().root().serialize();
    renderer.unmount();
    snapshot
}
