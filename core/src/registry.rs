//! Per-instance cache of resolved entity descriptors.
//!
//! A [`Registry`] describes each [`Record`] type once and hands out shared
//! [`EntityDef`]s afterwards. Registries are plain values: create one per
//! database (or share one through an `Arc`) instead of relying on global
//! state.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::entity::{EntityDef, Record};
use crate::validate::SchemaResult;

/// Read-through cache from record type to [`EntityDef`].
///
/// Concurrent first lookups of the same type may both build a descriptor;
/// the first one stored wins and every caller receives that instance.
#[derive(Debug, Default)]
pub struct Registry {
    entities: RwLock<HashMap<TypeId, Arc<EntityDef>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor of `T`, building and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns the [`SchemaError`](crate::SchemaError) raised by the type's
    /// declaration. Failed declarations are not cached.
    pub fn describe<T: Record>(&self) -> SchemaResult<Arc<EntityDef>> {
        let id = TypeId::of::<T>();
        {
            let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(def) = entities.get(&id) {
                return Ok(Arc::clone(def));
            }
        }

        let built = Arc::new(T::entity().build(type_name::<T>())?);
        let mut entities = self
            .entities
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(entities.entry(id).or_insert(built)))
    }

    /// Whether `T` has already been described.
    pub fn contains<T: Record>(&self) -> bool {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
