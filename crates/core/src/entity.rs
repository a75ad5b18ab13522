//! Catalog entities: records with identity that this layer reads but never mutates.

/// An entity is addressed by its identifier; two reads of the same id refer to
/// the same catalog record even if its attributes differ.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
