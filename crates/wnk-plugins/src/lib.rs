pub mod calculator;
pub mod files;
pub mod todo;
pub mod weather;
pub mod wordcount;

pub use files::FilesConfig;
pub use weather::WeatherConfig;

use std::rc::Rc;
use wnk_core::plugin::{Plugin, PluginManifest};

pub const BUILTIN_IDS: &[&str] = &[
    calculator::ID,
    files::ID,
    todo::ID,
    weather::ID,
    wordcount::ID,
];

/// Settings the built-ins read at construction time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuiltinConfig {
    pub files: FilesConfig,
    pub weather: WeatherConfig,
}

/// Binds a manifest to the built-in implementation with the same id.
pub fn bind(manifest: PluginManifest, config: &BuiltinConfig) -> Option<Rc<dyn Plugin>> {
    let plugin: Rc<dyn Plugin> = match manifest.id.as_str() {
        calculator::ID => Rc::new(calculator::Calculator::with_manifest(manifest)),
        files::ID => Rc::new(files::Files::with_manifest(manifest, config.files.clone())),
        todo::ID => Rc::new(todo::Todo::with_manifest(manifest)),
        weather::ID => Rc::new(weather::Weather::with_manifest(manifest, config.weather.clone())),
        wordcount::ID => Rc::new(wordcount::WordCount::with_manifest(manifest)),
        _ => return None,
    };
    Some(plugin)
}

/// Every built-in with its own manifest.
pub fn builtins(config: &BuiltinConfig) -> Vec<Rc<dyn Plugin>> {
    vec![
        Rc::new(calculator::Calculator::new()),
        Rc::new(files::Files::new(config.files.clone())),
        Rc::new(todo::Todo::new()),
        Rc::new(weather::Weather::new(config.weather.clone())),
        Rc::new(wordcount::WordCount::new()),
    ]
}
