use std::any::TypeId;
use std::collections::HashMap;

use crate::error::{MuxError, Result};

/// Identity of a Rust message type, as handed to a [`TypeDirectory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key for the static type of `value`.
    pub fn of_val<T: ?Sized + 'static>(_value: &T) -> Self {
        Self::of::<T>()
    }

    /// Rust type id.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Rust type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Maps message types to the wire type id.
///
/// Both endpoints of a connection must map every type they exchange to the
/// same id for the whole life of the connection.
pub trait TypeDirectory: Send + Sync {
    /// Wire type id for `key`, or [`MuxError::UnknownType`].
    fn classify(&self, key: TypeKey) -> Result<u32>;
}

/// Table-driven [`TypeDirectory`].
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    ids: HashMap<TypeId, u32>,
    names: HashMap<u32, &'static str>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `type_id` to `T`.
    ///
    /// Re-registering `T` under the id it already has is a no-op. Giving an
    /// id that belongs to another type fails with
    /// [`MuxError::DuplicateTypeId`].
    pub fn register<T: ?Sized + 'static>(&mut self, type_id: u32) -> Result<()> {
        let key = TypeKey::of::<T>();
        if let Some(&existing) = self.names.get(&type_id) {
            if self.ids.get(&key.id()) != Some(&type_id) {
                return Err(MuxError::DuplicateTypeId { type_id, existing });
            }
            return Ok(());
        }

        if let Some(previous) = self.ids.insert(key.id(), type_id) {
            self.names.remove(&previous);
        }
        self.names.insert(type_id, key.name());
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: ?Sized + 'static>(mut self, type_id: u32) -> Result<Self> {
        self.register::<T>(type_id)?;
        Ok(self)
    }

    /// Type name registered under `type_id`.
    pub fn type_name(&self, type_id: u32) -> Option<&'static str> {
        self.names.get(&type_id).copied()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if no type is registered.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl TypeDirectory for TypeRegistry {
    fn classify(&self, key: TypeKey) -> Result<u32> {
        self.ids
            .get(&key.id())
            .copied()
            .ok_or(MuxError::UnknownType {
                type_name: key.name(),
            })
    }
}
