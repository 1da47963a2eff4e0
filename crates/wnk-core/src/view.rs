use crate::element::Element;
use crate::events::{HostEventBus, SubscriptionId};
use crate::protocol::{HostEvent, HostEventKind};
use crate::reconciler::WnkHost;
use crate::render::Renderer;
use crate::root::HostRoot;
use crate::serialize::{RenderPayload, SerializedNode};
use crate::transport::OutputSink;
use crate::tree::{NodeId, NodeIdGen};
use serde_json::Value;
use std::cell::RefCell;
use tracing::{debug, warn};

/// The guest's own long-lived UI. Every commit is pushed to the output
/// channel as a render payload.
pub struct LiveView {
    renderer: RefCell<Renderer<WnkHost>>,
    bus: RefCell<HostEventBus>,
}

impl LiveView {
    pub fn new(ids: NodeIdGen, output: OutputSink) -> Self {
        let host = WnkHost::with_commit_callback(HostRoot::with_ids(ids), move |root: &HostRoot| {
            output.emit(RenderPayload::new(root.serialize()));
        });
        Self {
            renderer: RefCell::new(Renderer::new(host)),
            bus: RefCell::new(HostEventBus::new()),
        }
    }

    pub fn render(&self, element: &Element) {
        match self.renderer.try_borrow_mut() {
            Ok(mut renderer) => renderer.render(element),
            Err(_) => warn!("render requested during a commit; ignored"),
        }
    }

    pub fn unmount(&self) {
        match self.renderer.try_borrow_mut() {
            Ok(mut renderer) => renderer.unmount(),
            Err(_) => warn!("unmount requested during a commit; ignored"),
        }
    }

    pub fn serialize(&self) -> Option<SerializedNode> {
        self.renderer.borrow().host().root().serialize()
    }

    pub fn subscribe(&self, event: &str, listener: impl Fn(Option<&Value>) + 'static) -> SubscriptionId {
        self.bus.borrow_mut().subscribe(event, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.borrow_mut().unsubscribe(id)
    }

    /// Invokes a node's handler with no borrow held, so the handler may
    /// re-render. Returns whether a handler ran.
    pub fn dispatch(&self, node: NodeId, event: &str, payload: Option<&Value>) -> anyhow::Result<bool> {
        let handler = self.renderer.borrow().host().root().handler(node, event);
        match handler {
            Some(handler) => handler.call(payload).map(|()| true),
            None => Ok(false),
        }
    }

    /// Errors are logged and swallowed; events for vanished nodes are no-ops.
    pub fn handle_host_event(&self, event: &HostEvent) {
        match event.kind {
            HostEventKind::Press => self.dispatch_to_target(event, "onPress", None),
            HostEventKind::Change => self.dispatch_to_target(event, "onChange", event.payload.as_ref()),
            HostEventKind::Keydown => {
                let listeners = self.bus.borrow().listeners("keydown");
                for listener in listeners {
                    listener(event.payload.as_ref());
                }
            }
            HostEventKind::Focus | HostEventKind::Blur | HostEventKind::Unknown => {}
        }
    }

    fn dispatch_to_target(&self, event: &HostEvent, name: &str, payload: Option<&Value>) {
        let Some(node) = event
            .target_id
            .as_deref()
            .and_then(|raw| raw.parse::<NodeId>().ok())
        else {
            debug!(event = name, "host event without a valid target");
            return;
        };
        match self.dispatch(node, name, payload) {
            Ok(true) => {}
            Ok(false) => debug!(node = %node, event = name, "no handler for host event"),
            Err(err) => debug!(node = %node, event = name, error = %err, "host event handler failed"),
        }
    }
}

impl std::fmt::Debug for LiveView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveView").finish_non_exhaustive()
    }
}
