use crate::command::{CommandRoute, SET_SEARCH_TEXT};
use crate::panel::{default_panel, normalize_output, ActionItem, PanelData, PanelDefaults, PanelOutput, RenderedPanel};
use crate::plugin::{Plugin, PluginCapability, PluginRegistry};
use crate::protocol::{
    parse_line, ActionContext, ActionPanel, HostContext, InboundMessage, Incoming, OutboundMessage,
    PluginResultItem,
};
use crate::transport::OutputSink;
use crate::tree::NodeIdGen;
use crate::view::LiveView;
use serde_json::Number;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestClass {
    Query,
    Panel,
    Actions,
}

/// One monotonic counter per request class. A completion whose captured token
/// is no longer current is stale.
#[derive(Debug, Default)]
pub struct RequestTokens {
    query: Cell<u64>,
    panel: Cell<u64>,
    actions: Cell<u64>,
}

impl RequestTokens {
    fn counter(&self, class: RequestClass) -> &Cell<u64> {
        match class {
            RequestClass::Query => &self.query,
            RequestClass::Panel => &self.panel,
            RequestClass::Actions => &self.actions,
        }
    }

    pub fn bump(&self, class: RequestClass) -> u64 {
        let counter = self.counter(class);
        let next = counter.get().wrapping_add(1);
        counter.set(next);
        next
    }

    pub fn current(&self, class: RequestClass) -> u64 {
        self.counter(class).get()
    }

    pub fn is_current(&self, class: RequestClass, token: u64) -> bool {
        self.current(class) == token
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PanelReply {
    Panel,
    Subpanel,
}

impl PanelReply {
    fn message(self, plugin_id: String, panel: PanelData) -> OutboundMessage {
        match self {
            Self::Panel => OutboundMessage::panel(plugin_id, panel),
            Self::Subpanel => OutboundMessage::subpanel(plugin_id, panel),
        }
    }
}

fn cache_key(plugin_id: &str, item_id: &str) -> String {
    format!("{plugin_id}:{item_id}")
}

/// Routes input lines to plugins and the live view. All state lives here and
/// is only touched from the single-threaded local task set.
pub struct Dispatcher {
    plugins: PluginRegistry,
    tokens: RequestTokens,
    query_slots: RefCell<Vec<Vec<PluginResultItem>>>,
    action_cache: RefCell<HashMap<String, Vec<ActionItem>>>,
    last_panel_item: RefCell<HashMap<String, String>>,
    host_context: RefCell<Option<HostContext>>,
    ids: NodeIdGen,
    view: Rc<LiveView>,
    output: OutputSink,
    in_flight: Cell<usize>,
    idle: Notify,
}

impl Dispatcher {
    pub fn new(plugins: PluginRegistry, output: OutputSink) -> Rc<Self> {
        let ids = NodeIdGen::new();
        let view = Rc::new(LiveView::new(ids.clone(), output.clone()));
        Rc::new(Self {
            plugins,
            tokens: RequestTokens::default(),
            query_slots: RefCell::new(Vec::new()),
            action_cache: RefCell::new(HashMap::new()),
            last_panel_item: RefCell::new(HashMap::new()),
            host_context: RefCell::new(None),
            ids,
            view,
            output,
            in_flight: Cell::new(0),
            idle: Notify::new(),
        })
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn tokens(&self) -> &RequestTokens {
        &self.tokens
    }

    pub fn view(&self) -> &Rc<LiveView> {
        &self.view
    }

    pub fn cached_actions(&self, plugin_id: &str, item_id: &str) -> Option<Vec<ActionItem>> {
        self.action_cache
            .borrow()
            .get(&cache_key(plugin_id, item_id))
            .cloned()
    }

    pub fn last_panel_item(&self, plugin_id: &str) -> Option<String> {
        self.last_panel_item.borrow().get(plugin_id).cloned()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    /// Resolves once no spawned plugin call is pending.
    pub async fn wait_idle(&self) {
        while self.in_flight.get() > 0 {
            self.idle.notified().await;
        }
    }

    /// Malformed lines are dropped; anything that is not a request goes to
    /// the live view as a host event.
    pub fn handle_line(self: &Rc<Self>, line: &str) {
        match parse_line(line) {
            Ok(Incoming::Message(message)) => self.handle_message(message),
            Ok(Incoming::HostEvent(event)) => self.view.handle_host_event(&event),
            Err(err) => debug!(error = %err, "dropping input line"),
        }
    }

    pub fn handle_message(self: &Rc<Self>, message: InboundMessage) {
        debug!(message = message.as_tag(), "dispatch");
        match message {
            InboundMessage::Query { text, context } => self.on_query(text, context),
            InboundMessage::GetPanel { plugin_id, item_id } => {
                self.on_panel(plugin_id, item_id, PanelReply::Panel)
            }
            InboundMessage::GetSubpanel { plugin_id, item_id } => {
                self.on_panel(plugin_id, item_id, PanelReply::Subpanel)
            }
            InboundMessage::GetActions {
                token,
                panel,
                plugin_id,
                item_id,
                selected_id,
                selected_text,
                query,
            } => {
                let context = ActionContext {
                    panel,
                    plugin_id,
                    item_id,
                    selected_id,
                    selected_text,
                    query,
                    host_context: self.host_context.borrow().clone(),
                };
                self.on_actions(token, context)
            }
            InboundMessage::Command { name, text } => self.on_command(&name, text.unwrap_or_default()),
        }
    }

    fn spawn(self: &Rc<Self>, task: impl Future<Output = ()> + 'static) {
        self.in_flight.set(self.in_flight.get() + 1);
        let this = Rc::clone(self);
        tokio::task::spawn_local(async move {
            task.await;
            let left = this.in_flight.get().saturating_sub(1);
            this.in_flight.set(left);
            if left == 0 {
                this.idle.notify_one();
            }
        });
    }

    fn defaults_for(&self, plugin: Option<&Rc<dyn Plugin>>, plugin_id: &str) -> PanelDefaults {
        match plugin {
            Some(plugin) => PanelDefaults::titled(plugin.manifest().name.clone()),
            None => PanelDefaults::titled(plugin_id),
        }
    }

    fn normalize(&self, output: Option<PanelOutput>, defaults: &PanelDefaults) -> RenderedPanel {
        match output {
            Some(output) => normalize_output(output, defaults, &self.ids),
            None => default_panel(defaults),
        }
    }

    fn store_actions(&self, plugin_id: &str, item_id: &str, actions: &[ActionItem]) {
        let key = cache_key(plugin_id, item_id);
        let mut cache = self.action_cache.borrow_mut();
        if actions.is_empty() {
            cache.remove(&key);
        } else {
            cache.insert(key, actions.to_vec());
        }
    }

    fn emit_results(&self) {
        let items = self.query_slots.borrow().iter().flatten().cloned().collect();
        self.output.emit(OutboundMessage::Results { items });
    }

    fn on_query(self: &Rc<Self>, text: String, context: Option<HostContext>) {
        let token = self.tokens.bump(RequestClass::Query);
        let context = context.unwrap_or_default();
        *self.host_context.borrow_mut() = Some(context.clone());

        let plugins = self.plugins.list();
        *self.query_slots.borrow_mut() = vec![Vec::new(); plugins.len()];
        if plugins.is_empty() {
            self.emit_results();
            return;
        }

        for (slot, plugin) in plugins.into_iter().enumerate() {
            let this = Rc::clone(self);
            let text = text.clone();
            let context = context.clone();
            self.spawn(async move {
                let plugin_id = plugin.manifest().id.clone();
                let items = match plugin.get_results(&text, &context).await {
                    Ok(items) => items,
                    Err(err) => {
                        debug!(plugin = %plugin_id, error = %err, "getResults failed");
                        Vec::new()
                    }
                };
                if !this.tokens.is_current(RequestClass::Query, token) {
                    debug!(plugin = %plugin_id, token, "stale query completion");
                    return;
                }
                if let Some(entry) = this.query_slots.borrow_mut().get_mut(slot) {
                    *entry = items
                        .into_iter()
                        .map(|item| PluginResultItem {
                            plugin_id: plugin_id.clone(),
                            item,
                        })
                        .collect();
                }
                this.emit_results();
            });
        }
    }

    fn on_panel(self: &Rc<Self>, plugin_id: String, item_id: String, reply: PanelReply) {
        let token = self.tokens.bump(RequestClass::Panel);
        self.last_panel_item
            .borrow_mut()
            .insert(plugin_id.clone(), item_id.clone());

        let plugin = self.plugins.get(&plugin_id);
        let defaults = self.defaults_for(plugin.as_ref(), &plugin_id);
        let Some(plugin) = plugin.filter(|p| p.supports(PluginCapability::Panel)) else {
            debug!(plugin = %plugin_id, "no panel provider; sending default panel");
            self.output
                .emit(reply.message(plugin_id, default_panel(&defaults).panel));
            return;
        };

        let this = Rc::clone(self);
        self.spawn(async move {
            let output = match plugin.get_panel(&item_id).await {
                Ok(output) => output,
                Err(err) => {
                    debug!(plugin = %plugin_id, item = %item_id, error = %err, "getPanel failed");
                    None
                }
            };
            if !this.tokens.is_current(RequestClass::Panel, token) {
                debug!(plugin = %plugin_id, token, "stale panel completion");
                return;
            }
            let rendered = this.normalize(output, &defaults);
            this.store_actions(&plugin_id, &item_id, &rendered.actions);
            this.output.emit(reply.message(plugin_id, rendered.panel));
        });
    }

    fn on_actions(self: &Rc<Self>, token: Number, context: ActionContext) {
        self.tokens.bump(RequestClass::Actions);
        let Some(plugin) = self.plugins.get(&context.plugin_id) else {
            self.output.emit(OutboundMessage::Actions {
                token,
                plugin_id: context.plugin_id,
                items: Vec::new(),
            });
            return;
        };

        let this = Rc::clone(self);
        self.spawn(async move {
            let items = this.resolve_actions(&plugin, &context).await;
            this.output.emit(OutboundMessage::Actions {
                token,
                plugin_id: context.plugin_id,
                items,
            });
        });
    }

    /// Action provider first, then the panel cache, then (details only) a
    /// fresh panel render.
    async fn resolve_actions(&self, plugin: &Rc<dyn Plugin>, context: &ActionContext) -> Vec<ActionItem> {
        if plugin.supports(PluginCapability::Actions) {
            return match plugin.get_actions(context).await {
                Ok(items) => items,
                Err(err) => {
                    debug!(plugin = %context.plugin_id, error = %err, "getActions failed");
                    Vec::new()
                }
            };
        }
        if let Some(cached) = self.cached_actions(&context.plugin_id, &context.item_id) {
            return cached;
        }
        if context.panel != ActionPanel::Details || !plugin.supports(PluginCapability::Panel) {
            return Vec::new();
        }
        match plugin.get_panel(&context.item_id).await {
            Ok(Some(output)) => {
                let defaults = self.defaults_for(Some(plugin), &context.plugin_id);
                let rendered = normalize_output(output, &defaults, &self.ids);
                self.store_actions(&context.plugin_id, &context.item_id, &rendered.actions);
                rendered.actions
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                debug!(plugin = %context.plugin_id, error = %err, "getPanel for actions failed");
                Vec::new()
            }
        }
    }

    fn on_command(self: &Rc<Self>, name: &str, text: String) {
        let (plugin_id, command) = match CommandRoute::parse(name) {
            Some(CommandRoute::SetSearchText) => {
                self.output.emit(OutboundMessage::Effect {
                    name: SET_SEARCH_TEXT.to_string(),
                    text,
                });
                return;
            }
            Some(CommandRoute::Plugin { plugin_id, command }) => (plugin_id, command),
            None => {
                debug!(command = name, "unroutable command");
                return;
            }
        };
        let Some(plugin) = self
            .plugins
            .get(&plugin_id)
            .filter(|p| p.supports(PluginCapability::Commands))
        else {
            debug!(plugin = %plugin_id, command = %command, "no command handler");
            return;
        };

        let token = self.tokens.bump(RequestClass::Panel);
        let this = Rc::clone(self);
        self.spawn(async move {
            let output = match plugin.on_command(&command, &text).await {
                Ok(Some(output)) => output,
                Ok(None) => return,
                Err(err) => {
                    debug!(plugin = %plugin_id, command = %command, error = %err, "onCommand failed");
                    return;
                }
            };
            if !this.tokens.is_current(RequestClass::Panel, token) {
                debug!(plugin = %plugin_id, token, "stale command completion");
                return;
            }
            let defaults = this.defaults_for(Some(&plugin), &plugin_id);
            let rendered = normalize_output(output, &defaults, &this.ids);
            if let Some(item_id) = this.last_panel_item(&plugin_id) {
                this.store_actions(&plugin_id, &item_id, &rendered.actions);
            }
            this.output
                .emit(OutboundMessage::panel(plugin_id, rendered.panel));
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("plugins", &self.plugins)
            .field("tokens", &self.tokens)
            .field("in_flight", &self.in_flight.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginError, PluginManifest};
    use crate::protocol::{OutputLine, ResultItem};
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::task::LocalSet;

    struct Fixed {
        manifest: PluginManifest,
        items: Vec<ResultItem>,
        fail: bool,
    }

    #[async_trait(?Send)]
    impl Plugin for Fixed {
        fn manifest(&self) -> &PluginManifest {
            &self.manifest
        }

        async fn get_results(&self, _query: &str, _context: &HostContext) -> Result<Vec<ResultItem>, PluginError> {
            if self.fail {
                return Err(PluginError::Failed("boom".to_string()));
            }
            Ok(self.items.clone())
        }
    }

    fn fixed(id: &str, titles: &[&str], fail: bool) -> Rc<dyn Plugin> {
        Rc::new(Fixed {
            manifest: PluginManifest::new(id, id),
            items: titles.iter().map(|t| ResultItem::new(*t)).collect(),
            fail,
        })
    }

    fn drain(rx: &mut UnboundedReceiver<OutputLine>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(line) = rx.try_recv() {
            if let OutputLine::Message(message) = line {
                out.push(message);
            }
        }
        out
    }

    #[test]
    fn tokens_are_independent_per_class() {
        let tokens = RequestTokens::default();
        assert_eq!(tokens.bump(RequestClass::Query), 1);
        assert_eq!(tokens.bump(RequestClass::Query), 2);
        assert_eq!(tokens.bump(RequestClass::Panel), 1);
        assert!(tokens.is_current(RequestClass::Query, 2));
        assert!(!tokens.is_current(RequestClass::Query, 1));
        assert_eq!(tokens.current(RequestClass::Actions), 0);
    }

    #[tokio::test]
    async fn zero_plugins_emit_one_empty_results_line() {
        let (sink, mut rx) = OutputSink::channel();
        let dispatcher = Dispatcher::new(PluginRegistry::new(), sink);

        dispatcher.handle_line(r#"{"type":"query","text":"x"}"#);

        assert_eq!(drain(&mut rx), vec![OutboundMessage::Results { items: Vec::new() }]);
    }

    #[tokio::test]
    async fn failing_plugin_yields_empty_slot_but_results_still_merge() {
        LocalSet::new()
            .run_until(async {
                let mut registry = PluginRegistry::new();
                registry.register(fixed("alpha", &["a1", "a2"], false)).expect("alpha");
                registry.register(fixed("beta", &[], true)).expect("beta");
                let (sink, mut rx) = OutputSink::channel();
                let dispatcher = Dispatcher::new(registry, sink);

                dispatcher.handle_line(r#"{"type":"query","text":"q"}"#);
                dispatcher.wait_idle().await;

                let messages = drain(&mut rx);
                assert_eq!(messages.len(), 2);
                let Some(OutboundMessage::Results { items }) = messages.last() else {
                    panic!("expected results");
                };
                let titles: Vec<_> = items
                    .iter()
                    .map(|i| (i.plugin_id.as_str(), i.item.title.as_str()))
                    .collect();
                assert_eq!(titles, vec![("alpha", "a1"), ("alpha", "a2")]);
            })
            .await;
    }

    #[tokio::test]
    async fn missing_plugin_gets_default_panel_titled_by_id() {
        let (sink, mut rx) = OutputSink::channel();
        let dispatcher = Dispatcher::new(PluginRegistry::new(), sink);

        dispatcher.handle_line(r#"{"type":"getSubpanel","pluginId":"ghost","itemId":"x"}"#);

        let messages = drain(&mut rx);
        let expected = default_panel(&PanelDefaults::titled("ghost")).panel;
        assert_eq!(messages, vec![OutboundMessage::subpanel("ghost", expected)]);
        assert_eq!(dispatcher.last_panel_item("ghost").as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn actions_for_unknown_plugin_echo_the_token() {
        let (sink, mut rx) = OutputSink::channel();
        let dispatcher = Dispatcher::new(PluginRegistry::new(), sink);

        dispatcher.handle_line(r#"{"type":"getActions","token":41,"panel":"details","pluginId":"p","itemId":"i"}"#);

        assert_eq!(
            drain(&mut rx),
            vec![OutboundMessage::Actions {
                token: Number::from(41),
                plugin_id: "p".to_string(),
                items: Vec::new(),
            }]
        );
    }

    #[tokio::test]
    async fn fractional_and_negative_tokens_are_echoed_verbatim() {
        let (sink, mut rx) = OutputSink::channel();
        let dispatcher = Dispatcher::new(PluginRegistry::new(), sink);

        dispatcher.handle_line(r#"{"type":"getActions","token":-2.5,"pluginId":"p","itemId":"i"}"#);
        dispatcher.handle_line(r#"{"type":"getActions","token":-3,"pluginId":"p","itemId":"i"}"#);

        let tokens: Vec<serde_json::Value> = drain(&mut rx)
            .into_iter()
            .map(|message| serde_json::to_value(message).expect("json")["token"].clone())
            .collect();
        assert_eq!(tokens, vec![serde_json::json!(-2.5), serde_json::json!(-3)]);
    }

    #[tokio::test]
    async fn set_search_text_is_an_effect_and_bad_commands_are_ignored() {
        let (sink, mut rx) = OutputSink::channel();
        let dispatcher = Dispatcher::new(PluginRegistry::new(), sink);

        dispatcher.handle_line(r#"{"type":"command","name":"setSearchText","text":"todo "}"#);
        dispatcher.handle_line(r#"{"type":"command","name":"nodot"}"#);
        dispatcher.handle_line(r#"{"type":"command","name":"ghost.run"}"#);

        assert_eq!(
            drain(&mut rx),
            vec![OutboundMessage::Effect {
                name: "setSearchText".to_string(),
                text: "todo ".to_string(),
            }]
        );
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
