pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod events;
pub mod notifications;
pub mod plugins;
pub mod tabs;
pub mod ui;

pub use app::App;
