/// Host effect passthrough; never routed to a plugin.
pub const SET_SEARCH_TEXT: &str = "setSearchText";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandRoute {
    SetSearchText,
    Plugin { plugin_id: String, command: String },
}

impl CommandRoute {
    pub fn parse(input: &str) -> Option<Self> {
        input.parse().ok()
    }

    pub fn as_name(&self) -> String {
        match self {
            Self::SetSearchText => SET_SEARCH_TEXT.to_string(),
            Self::Plugin { plugin_id, command } => format!("{plugin_id}.{command}"),
        }
    }
}

impl std::str::FromStr for CommandRoute {
    type Err = ();

    /// Splits `pluginId.commandName` on the first dot.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input == SET_SEARCH_TEXT {
            return Ok(Self::SetSearchText);
        }
        let (plugin_id, command) = input.split_once('.').ok_or(())?;
        if plugin_id.is_empty() || command.is_empty() {
            return Err(());
        }
        Ok(Self::Plugin {
            plugin_id: plugin_id.to_string(),
            command: command.to_string(),
        })
    }
}
