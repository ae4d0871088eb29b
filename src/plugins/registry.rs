//! Tab factory registry
//!
//! The registry maps a factory identifier to a constructor. It is filled once
//! at startup from the compiled-in list of tab modules; the loader only ever
//! instantiates tabs through it.

use super::core::{Tab, TabContext, TabError, TabResult, TabType};

use std::collections::HashMap;
use std::fmt;

/// Constructor stored in the registry
pub type TabConstructor = Box<dyn Fn(TabContext) -> TabResult<Box<dyn Tab>> + Send + Sync>;

/// One registered tab factory
pub struct TabRegistration {
    id: String,
    type_name: &'static str,
    display_name: &'static str,
    constructor: TabConstructor,
}

impl TabRegistration {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn display_name(&self) -> &'static str {
        self.display_name
    }

    /// Run the constructor with the given context
    pub fn construct(&self, ctx: TabContext) -> TabResult<Box<dyn Tab>> {
        (self.constructor)(ctx)
    }
}

impl fmt::Debug for TabRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabRegistration")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Registry of tab factories, in registration order
#[derive(Debug, Default)]
pub struct TabRegistry {
    entries: Vec<TabRegistration>,
    by_id: HashMap<String, usize>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tab type under `id`
    pub fn register<T: TabType>(&mut self, id: impl Into<String>) -> TabResult<()> {
        self.register_fn(id, T::TYPE_NAME, T::DISPLAY_NAME, |ctx| {
            T::construct(ctx).map(|tab| Box::new(tab) as Box<dyn Tab>)
        })
    }

    /// Register an arbitrary constructor under `id`
    pub fn register_fn<F>(
        &mut self,
        id: impl Into<String>,
        type_name: &'static str,
        display_name: &'static str,
        constructor: F,
    ) -> TabResult<()>
    where
        F: Fn(TabContext) -> TabResult<Box<dyn Tab>> + Send + Sync + 'static,
    {
        let id = id.into();
        if self.by_id.contains_key(&id) {
            return Err(TabError::AlreadyRegistered(id));
        }

        self.by_id.insert(id.clone(), self.entries.len());
        self.entries.push(TabRegistration {
            id,
            type_name,
            display_name,
            constructor: Box::new(constructor),
        });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&TabRegistration> {
        self.by_id.get(id).map(|&index| &self.entries[index])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Identifiers in registration order
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TabRegistration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
