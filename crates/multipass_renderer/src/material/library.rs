//! Material definition library
//!
//! Owns every material definition and notifies attached handlers when one is deleted
//! or reloaded, so caches keyed by definition can drop stale entries.

use log::{debug, info};

use crate::foundation::collections::{MaterialDefinitionId, SlotMap};

use super::definition::MaterialDefinition;

slotmap::new_key_type! {
    /// Handler attached to a [`MaterialLibrary`]
    pub struct MaterialHandlerId;
}

/// Receives definition lifecycle notifications
///
/// Notifications are delivered synchronously on the thread that edits the library.
pub trait MaterialEventHandler {
    /// The definition was removed from the library
    fn on_delete_material_definition(&mut self, definition: MaterialDefinitionId);

    /// The definition's shader functions changed
    fn on_reload_material_definition(&mut self, definition: MaterialDefinitionId);
}

/// Registry of material definitions
#[derive(Default)]
pub struct MaterialLibrary {
    definitions: SlotMap<MaterialDefinitionId, MaterialDefinition>,
    handlers: SlotMap<MaterialHandlerId, Box<dyn MaterialEventHandler>>,
}

impl std::fmt::Debug for MaterialLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialLibrary")
            .field("definitions", &self.definitions.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl MaterialLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition
    pub fn create_definition(&mut self, definition: MaterialDefinition) -> MaterialDefinitionId {
        let name = definition.name.clone();
        let id = self.definitions.insert(definition);
        info!("Registered material definition '{}' as {:?}", name, id);
        id
    }

    /// Definition lookup
    pub fn definition(&self, id: MaterialDefinitionId) -> Option<&MaterialDefinition> {
        self.definitions.get(id)
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if the library holds no definitions
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Remove a definition and notify handlers
    pub fn delete_definition(&mut self, id: MaterialDefinitionId) -> Option<MaterialDefinition> {
        let definition = self.definitions.remove(id)?;
        debug!("Deleting material definition '{}'", definition.name);
        for handler in self.handlers.values_mut() {
            handler.on_delete_material_definition(id);
        }
        Some(definition)
    }

    /// Replace a definition's shader functions and notify handlers
    ///
    /// Returns false if the definition does not exist.
    pub fn reload_definition(&mut self, id: MaterialDefinitionId, mut definition: MaterialDefinition) -> bool {
        let Some(slot) = self.definitions.get_mut(id) else {
            return false;
        };
        definition.revision = slot.revision.wrapping_add(1);
        debug!("Reloading material definition '{}' (revision {})", definition.name, definition.revision);
        *slot = definition;
        for handler in self.handlers.values_mut() {
            handler.on_reload_material_definition(id);
        }
        true
    }

    /// Attach an event handler
    pub fn attach_handler(&mut self, handler: Box<dyn MaterialEventHandler>) -> MaterialHandlerId {
        self.handlers.insert(handler)
    }

    /// Detach an event handler, returning it
    pub fn detach_handler(&mut self, id: MaterialHandlerId) -> Option<Box<dyn MaterialEventHandler>> {
        self.handlers.remove(id)
    }

    /// Number of attached handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<(&'static str, MaterialDefinitionId)>>>,
    }

    impl MaterialEventHandler for Recorder {
        fn on_delete_material_definition(&mut self, definition: MaterialDefinitionId) {
            self.events.borrow_mut().push(("delete", definition));
        }

        fn on_reload_material_definition(&mut self, definition: MaterialDefinitionId) {
            self.events.borrow_mut().push(("reload", definition));
        }
    }

    #[test]
    fn test_handlers_receive_delete_and_reload() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut library = MaterialLibrary::new();
        let handler = library.attach_handler(Box::new(Recorder { events: events.clone() }));

        let id = library.create_definition(MaterialDefinition::new("stone"));
        assert!(library.reload_definition(id, MaterialDefinition::new("stone")));
        assert_eq!(library.definition(id).map(|d| d.revision), Some(1));
        assert!(library.delete_definition(id).is_some());
        assert_eq!(*events.borrow(), vec![("reload", id), ("delete", id)]);

        // Detached handlers hear nothing
        library.detach_handler(handler);
        let other = library.create_definition(MaterialDefinition::new("wood"));
        library.delete_definition(other);
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn test_reload_unknown_definition_fails() {
        let mut library = MaterialLibrary::new();
        let id = library.create_definition(MaterialDefinition::new("glass"));
        library.delete_definition(id);
        assert!(!library.reload_definition(id, MaterialDefinition::new("glass")));
        assert!(library.is_empty());
    }
}
