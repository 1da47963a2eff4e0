use async_trait::async_trait;
use std::cell::RefCell;
use wnk_core::element::Element;
use wnk_core::panel::{ActionInput, ActionItem, Direction, PanelBottom, PanelOutput, PanelTop};
use wnk_core::plugin::{Plugin, PluginCapability, PluginError, PluginManifest};
use wnk_core::protocol::{ActionContext, ActionPanel, HostContext, ResultItem};
use wnk_core::sdk;

pub const ID: &str = "todo";

const ADD_PREFIX: &str = "add:";
const TODO_PREFIX: &str = "todo:";
const CHECK_EMPTY: &str = "[ ]";
const CHECK_DONE: &str = "[x]";
const LIST_SUBTITLE: &str = "Open checklist (session only)";
const FOOTER: &str = "W/S: move  Enter: open/actions  k: actions  Esc: back  |  Add: type \"todo <text>\"";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TodoEntry {
    pub id: u64,
    pub text: String,
    pub done: bool,
}

#[derive(Debug)]
struct TodoState {
    next_id: u64,
    entries: Vec<TodoEntry>,
}

impl TodoState {
    fn seeded() -> Self {
        let mut state = Self {
            next_id: 1,
            entries: Vec::new(),
        };
        state.add("Try toggling me (press k)");
        state.add("Type \"todo Buy milk\" to add");
        state
    }

    fn add(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.entries.push(TodoEntry {
            id: self.next_id,
            text: text.to_string(),
            done: false,
        });
        self.next_id += 1;
    }

    fn toggle(&mut self, raw: &str) {
        let Some(id) = parse_id(raw) else { return };
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.done = !entry.done;
        }
    }

    fn delete(&mut self, raw: &str) {
        let Some(id) = parse_id(raw) else { return };
        self.entries.retain(|e| e.id != id);
    }
}

fn parse_id(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}

/// `todo <text>` (case-insensitive keyword) yields the text to add.
fn parse_add(query: &str) -> Option<&str> {
    let trimmed = query.trim();
    let keyword = trimmed.get(..4)?;
    if !keyword.eq_ignore_ascii_case("todo") {
        return None;
    }
    let rest = &trimmed[4..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim()).filter(|text| !text.is_empty())
}

fn is_command_query(query: &str) -> bool {
    query
        .trim()
        .get(..4)
        .is_some_and(|keyword| keyword.eq_ignore_ascii_case("todo"))
}

/// Session-only checklist. State lives for the life of the process.
#[derive(Debug)]
pub struct Todo {
    manifest: PluginManifest,
    state: RefCell<TodoState>,
}

impl Todo {
    pub fn new() -> Self {
        Self::with_manifest(PluginManifest::new(ID, "Todo").with_icon("T"))
    }

    pub fn with_manifest(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            state: RefCell::new(TodoState::seeded()),
        }
    }

    pub fn entries(&self) -> Vec<TodoEntry> {
        self.state.borrow().entries.clone()
    }

    fn panel(&self) -> Element {
        let state = self.state.borrow();
        let done = state.entries.iter().filter(|e| e.done).count();
        let pending = state.entries.len() - done;

        let items = state.entries.iter().map(|entry| {
            let glyph = if entry.done { CHECK_DONE } else { CHECK_EMPTY };
            let id = format!("{TODO_PREFIX}{}", entry.id);
            sdk::item(Some(id.as_str()), format!("{glyph} {}", entry.text), "")
                .key(entry.id.to_string())
                .has_actions()
        });

        sdk::panel(&PanelTop::header(
            "Todo",
            Some(format!("{pending} pending \u{b7} {done} done (session only)")),
        ))
        .with_bottom(&PanelBottom::Info {
            text: FOOTER.to_string(),
        })
        .dir(Direction::Vertical)
        .gap(12.0)
        .child(
            sdk::flex()
                .child(sdk::item(Some("add"), "+ Add Todo", "Create a new item").key("add").has_actions())
                .children(items),
        )
    }
}

impl Default for Todo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Plugin for Todo {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn capabilities(&self) -> &[PluginCapability] {
        &[
            PluginCapability::Results,
            PluginCapability::Panel,
            PluginCapability::Actions,
            PluginCapability::Commands,
        ]
    }

    async fn get_results(&self, query: &str, _context: &HostContext) -> Result<Vec<ResultItem>, PluginError> {
        let trimmed = query.trim();
        let subtitle = if is_command_query(query) && !trimmed.eq_ignore_ascii_case("todo") {
            query
        } else {
            LIST_SUBTITLE
        };

        let mut items = Vec::with_capacity(2);
        if let Some(text) = parse_add(query) {
            items.push(
                ResultItem::new(format!("Add Todo: {text}"))
                    .id(format!("{ADD_PREFIX}{text}"))
                    .subtitle(query)
                    .icon("+"),
            );
        }
        items.push(ResultItem::new("Todo List").id("list").subtitle(subtitle).icon("T"));
        Ok(items)
    }

    async fn get_panel(&self, item_id: &str) -> Result<Option<PanelOutput>, PluginError> {
        if let Some(text) = item_id.strip_prefix(ADD_PREFIX) {
            self.state.borrow_mut().add(text);
        } else if item_id != "list" {
            return Ok(None);
        }
        Ok(Some(self.panel().into()))
    }

    async fn get_actions(&self, context: &ActionContext) -> Result<Vec<ActionItem>, PluginError> {
        if context.panel != ActionPanel::Details || context.item_id != "list" {
            return Ok(Vec::new());
        }
        let selected = context.selected_id.as_deref().map(str::trim).unwrap_or_default();

        if selected == "add" {
            return Ok(vec![ActionItem {
                close_on_execute: Some(true),
                input: Some(ActionInput {
                    placeholder: Some("Todo text...".to_string()),
                    initial: None,
                }),
                ..ActionItem::new("todo.add", "Add Todo")
            }]);
        }

        let Some(id) = selected
            .strip_prefix(TODO_PREFIX)
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
        else {
            return Ok(Vec::new());
        };
        Ok(vec![
            ActionItem {
                text: Some(id.to_string()),
                close_on_execute: Some(false),
                ..ActionItem::new("todo.toggle", "Toggle")
            },
            ActionItem {
                text: Some(id.to_string()),
                close_on_execute: Some(true),
                ..ActionItem::new("todo.delete", "Delete")
            },
        ])
    }

    async fn on_command(&self, name: &str, text: &str) -> Result<Option<PanelOutput>, PluginError> {
        {
            let mut state = self.state.borrow_mut();
            match name {
                "add" => state.add(text),
                "toggle" => state.toggle(text),
                "delete" => state.delete(text),
                _ => return Ok(None),
            }
        }
        Ok(Some(self.panel().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wnk_core::panel::{normalize_output, PanelDefaults, PanelItem, PanelNode};
    use wnk_core::tree::NodeIdGen;

    fn details(selected: &str) -> ActionContext {
        ActionContext {
            panel: ActionPanel::Details,
            plugin_id: ID.to_string(),
            item_id: "list".to_string(),
            selected_id: Some(selected.to_string()),
            ..ActionContext::default()
        }
    }

    #[test]
    fn add_query_parsing() {
        assert_eq!(parse_add("todo Buy milk"), Some("Buy milk"));
        assert_eq!(parse_add("  TODO   x  "), Some("x"));
        assert_eq!(parse_add("todo"), None);
        assert_eq!(parse_add("todo   "), None);
        assert_eq!(parse_add("todos list"), None);
    }

    #[tokio::test]
    async fn results_offer_add_before_list() {
        let plugin = Todo::new();
        let items = plugin
            .get_results("todo Buy milk", &HostContext::default())
            .await
            .expect("results");
        assert_eq!(
            items,
            vec![
                ResultItem::new("Add Todo: Buy milk")
                    .id("add:Buy milk")
                    .subtitle("todo Buy milk")
                    .icon("+"),
                ResultItem::new("Todo List")
                    .id("list")
                    .subtitle("todo Buy milk")
                    .icon("T"),
            ]
        );

        let items = plugin
            .get_results("", &HostContext::default())
            .await
            .expect("results");
        assert_eq!(items, vec![ResultItem::new("Todo List").id("list").subtitle(LIST_SUBTITLE).icon("T")]);
    }

    #[tokio::test]
    async fn panel_lists_entries_in_one_flex_group() {
        let plugin = Todo::new();
        let output = plugin
            .get_panel("add:Buy milk")
            .await
            .expect("panel")
            .expect("some panel");
        let rendered = normalize_output(output, &PanelDefaults::titled("Todo"), &NodeIdGen::new());

        assert_eq!(
            rendered.panel.top,
            PanelTop::header("Todo", Some("3 pending \u{b7} 0 done (session only)".to_string()))
        );
        let PanelNode::Box { dir, gap, children } = rendered.panel.main else {
            panic!("expected box main");
        };
        assert_eq!(dir, Some(Direction::Vertical));
        assert_eq!(gap, Some(12.0));
        let [PanelNode::Flex { items }] = children.as_slice() else {
            panic!("expected a single flex group");
        };
        assert_eq!(items.len(), 4);
        assert_eq!(
            items[3],
            PanelItem {
                has_actions: Some(true),
                ..PanelItem::new("[ ] Buy milk", "").with_id("todo:3")
            }
        );
        assert!(plugin.get_panel("other").await.expect("panel").is_none());
    }

    #[tokio::test]
    async fn actions_depend_on_selection() {
        let plugin = Todo::new();

        let add = plugin.get_actions(&details("add")).await.expect("actions");
        assert_eq!(add.len(), 1);
        assert_eq!(add[0].name, "todo.add");
        assert_eq!(
            add[0].input.as_ref().and_then(|i| i.placeholder.as_deref()),
            Some("Todo text...")
        );

        let entry = plugin.get_actions(&details("todo:2")).await.expect("actions");
        let names: Vec<_> = entry.iter().map(|a| (a.name.as_str(), a.text.as_deref())).collect();
        assert_eq!(names, vec![("todo.toggle", Some("2")), ("todo.delete", Some("2"))]);

        assert!(plugin.get_actions(&details("todo:x")).await.expect("actions").is_empty());
        let search = ActionContext {
            panel: ActionPanel::Search,
            ..details("todo:1")
        };
        assert!(plugin.get_actions(&search).await.expect("actions").is_empty());
    }

    #[tokio::test]
    async fn commands_mutate_state() {
        let plugin = Todo::new();

        plugin.on_command("add", "write tests").await.expect("add");
        plugin.on_command("toggle", "1").await.expect("toggle");
        plugin.on_command("delete", " 2 ").await.expect("delete");
        plugin.on_command("toggle", "nope").await.expect("bad id is ignored");

        let entries: Vec<_> = plugin
            .entries()
            .into_iter()
            .map(|e| (e.id, e.text, e.done))
            .collect();
        assert_eq!(
            entries,
            vec![
                (1, "Try toggling me (press k)".to_string(), true),
                (3, "write tests".to_string(), false),
            ]
        );
        assert!(plugin.on_command("rename", "").await.expect("unknown").is_none());
    }
}
