//! The program registry: explicit name-to-descriptor registration.
//!
//! Programs are registered up front by the host application. Mounting a
//! block whose program name is absent is a lookup failure, surfaced as a
//! persistent error marker on that block rather than a crash.

use std::collections::HashMap;
use std::rc::Rc;

use crate::program::ProgramDescriptor;

/// Registry of available programs, keyed by name.
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    programs: HashMap<String, Rc<ProgramDescriptor>>,
}

impl ProgramRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a program. Replaces any previous program of the same name
    /// and returns true if one was replaced.
    pub fn register(&mut self, descriptor: ProgramDescriptor) -> bool {
        let name = descriptor.name.clone();
        let replaced = self.programs.insert(name.clone(), Rc::new(descriptor));
        if replaced.is_some() {
            log::warn!("Program '{}' re-registered", name);
        }
        replaced.is_some()
    }

    /// Look up a program by name.
    pub fn lookup(&self, name: &str) -> Option<Rc<ProgramDescriptor>> {
        self.programs.get(name).cloned()
    }

    /// Whether a program is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Registered program names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.programs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ProgramRegistry::new();
        assert!(!registry.register(ProgramDescriptor::new("note", || json!({"text": ""}))));
        assert!(registry.contains("note"));
        assert!(registry.lookup("note").is_some());
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = ProgramRegistry::new();
        registry.register(ProgramDescriptor::new("note", || json!(1)));
        assert!(registry.register(ProgramDescriptor::new("note", || json!(2))));
        let program = registry.lookup("note").unwrap();
        assert_eq!((program.init)(), json!(2));
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = ProgramRegistry::new();
        registry.register(ProgramDescriptor::new("timer", || json!(null)));
        registry.register(ProgramDescriptor::new("counter", || json!(null)));
        assert_eq!(registry.names(), vec!["counter", "timer"]);
    }
}
