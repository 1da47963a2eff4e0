use async_trait::async_trait;
use std::cell::RefCell;
use wnk_core::element::Element;
use wnk_core::panel::{Direction, PanelBottom, PanelOutput, PanelTop};
use wnk_core::plugin::{Plugin, PluginCapability, PluginError, PluginManifest};
use wnk_core::protocol::{HostContext, ResultItem};
use wnk_core::sdk;

pub const ID: &str = "wordcount";
const ITEM_ID: &str = "selection";
const PREVIEW_LEN: usize = 160;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Runs of letters/digits, optionally joined by a single `'`, `_` or `-`.
pub fn count_words(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut count = 0;
    let mut i = 0;
    while i < chars.len() {
        if !is_word_char(chars[i]) {
            i += 1;
            continue;
        }
        count += 1;
        loop {
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            let joined = i + 1 < chars.len()
                && matches!(chars[i], '\'' | '_' | '-')
                && is_word_char(chars[i + 1]);
            if !joined {
                break;
            }
            i += 1;
        }
    }
    count
}

/// `\r\n`, `\r` and `\n` each end a line; empty text has none.
pub fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.replace("\r\n", "\n").split(['\n', '\r']).count()
}

fn preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= PREVIEW_LEN {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(PREVIEW_LEN - 3).collect();
    cut.push_str("...");
    cut
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionStats {
    pub selection: String,
    pub source: Option<String>,
    pub words: usize,
    pub chars: usize,
    pub lines: usize,
}

impl SelectionStats {
    pub fn of(selection: &str, source: Option<String>) -> Self {
        Self {
            selection: selection.to_string(),
            source,
            words: count_words(selection),
            chars: selection.chars().count(),
            lines: count_lines(selection),
        }
    }
}

/// Counts the host's current selection. The last snapshot backs the panel.
#[derive(Debug)]
pub struct WordCount {
    manifest: PluginManifest,
    last: RefCell<SelectionStats>,
}

impl WordCount {
    pub fn new() -> Self {
        Self::with_manifest(PluginManifest::new(ID, "Word Count").with_icon("WC"))
    }

    pub fn with_manifest(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            last: RefCell::new(SelectionStats::default()),
        }
    }

    fn empty_panel() -> Element {
        sdk::panel(&PanelTop::header("Word Count", Some("No selection".to_string())))
            .with_bottom(&PanelBottom::Info {
                text: "Alt+Space to refresh selection".to_string(),
            })
            .child(sdk::item(None, "Select text in another app", "Press Alt+Space to refresh"))
    }

    fn stats_panel(stats: &SelectionStats) -> Element {
        let source = match &stats.source {
            Some(source) => format!("Source: {source}"),
            None => "Source: unknown".to_string(),
        };
        sdk::panel(&PanelTop::header("Word Count", Some(source)))
            .with_bottom(&PanelBottom::Info {
                text: "Enter: open  Esc: back  Alt+Space: refresh".to_string(),
            })
            .dir(Direction::Vertical)
            .gap(12.0)
            .child(sdk::flex().child(sdk::item(None, "Selection", preview(&stats.selection))))
            .child(sdk::grid_items(Some(3), Some(12.0)).children([
                sdk::item(None, stats.words.to_string(), "Words"),
                sdk::item(None, stats.chars.to_string(), "Chars"),
                sdk::item(None, stats.lines.to_string(), "Lines"),
            ]))
    }
}

impl Default for WordCount {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Plugin for WordCount {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn capabilities(&self) -> &[PluginCapability] {
        &[PluginCapability::Results, PluginCapability::Panel]
    }

    async fn get_results(&self, query: &str, context: &HostContext) -> Result<Vec<ResultItem>, PluginError> {
        let selection = context.selection_text.as_deref().unwrap_or_default();
        if selection.trim().is_empty() {
            *self.last.borrow_mut() = SelectionStats {
                source: context.selection_source.clone(),
                ..SelectionStats::default()
            };
            if !query.trim().is_empty() {
                return Ok(Vec::new());
            }
            return Ok(vec![ResultItem::new("Word Count")
                .id(ITEM_ID)
                .subtitle("No selection")
                .icon("WC")]);
        }

        let stats = SelectionStats::of(selection, context.selection_source.clone());
        let item = ResultItem::new(format!("Words: {}", stats.words))
            .id(ITEM_ID)
            .subtitle(format!("Chars: {}", stats.chars))
            .icon("WC");
        *self.last.borrow_mut() = stats;
        Ok(vec![item])
    }

    async fn get_panel(&self, _item_id: &str) -> Result<Option<PanelOutput>, PluginError> {
        let stats = self.last.borrow().clone();
        let panel = if stats.selection.trim().is_empty() {
            Self::empty_panel()
        } else {
            Self::stats_panel(&stats)
        };
        Ok(Some(panel.into()))
    }
}
