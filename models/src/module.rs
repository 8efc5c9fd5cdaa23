//! Grouping of related model types.

use propsync::registry::{TypeDef, TypeRegistry};
use propsync::error::RegistryError;

/// A named group of type declarations, registered together.
///
/// Types within a module are listed parents first; modules themselves are
/// registered in dependency order by [`crate::modules`].
#[derive(Debug, Clone)]
pub struct TypeModule {
    /// Short module name, e.g. `"widgets"`.
    pub name: &'static str,
    /// One-line description.
    pub summary: &'static str,
    /// Type declarations, parents before children.
    pub types: Vec<TypeDef>,
}

impl TypeModule {
    /// Names of the declared types.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(TypeDef::name)
    }

    /// Registers every type of the module.
    ///
    /// # Errors
    ///
    /// Stops at the first [`RegistryError`], leaving earlier types
    /// registered.
    pub fn register_into(&self, registry: &mut TypeRegistry) -> Result<(), RegistryError> {
        registry.register_all(self.types.iter().cloned())?;
        tracing::trace!(module = self.name, types = self.types.len(), "registered type module");
        Ok(())
    }
}
