pub mod command;
pub mod dispatch;
pub mod element;
pub mod events;
pub mod panel;
pub mod plugin;
pub mod protocol;
pub mod reconciler;
pub mod render;
pub mod root;
pub mod sdk;
pub mod serialize;
pub mod transport;
pub mod tree;
pub mod value;
pub mod view;
