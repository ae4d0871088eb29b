//! Tab plugin architecture for deskshell
//!
//! Every page of the main window is a tab plugin. A tab type implements
//! [`Tab`] (the runtime lifecycle) and [`TabType`] (its names and a
//! constructor that takes exactly one [`TabContext`]), and is registered in a
//! [`TabRegistry`] at startup. The [`TabLoader`] then decides which
//! registered tabs to instantiate by scanning a tabs directory.
//!
//! # Architecture
//!
//! ```rust,ignore
//! use deskshell::plugins::{Tab, TabContext, TabRegistry, TabResult, TabType};
//!
//! struct NotesTab { parent: TabContext }
//!
//! impl TabType for NotesTab {
//!     const TYPE_NAME: &'static str = "NotesTab";
//!     const DISPLAY_NAME: &'static str = "Notes";
//!
//!     fn construct(ctx: TabContext) -> TabResult<Self> {
//!         Ok(Self { parent: ctx })
//!     }
//! }
//!
//! let mut registry = TabRegistry::new();
//! registry.register::<NotesTab>("notes")?;
//! ```
//!
//! # Rules
//!
//! - Tabs never import each other.
//! - Tabs never open storage themselves; they go through the data API
//!   reachable from their parent handle.
//! - Constructors take the context and nothing else.

pub mod core;
pub mod loader;
pub mod registry;


// Re-export main types for convenience
pub use core::{
    HostHandle, HostMessage, KeyOutcome, Tab, TabContext, TabError, TabResult, TabType,
};
pub use loader::{TabLoader, TabManifest, ENTRY_FILE};
pub use registry::{TabConstructor, TabRegistration, TabRegistry};
