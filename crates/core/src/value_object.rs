//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two instances holding the same values
/// are the same value. `Money { minor: 1000 }` is a value object, a `Shop`
/// with a `StoreId` is an entity.
///
/// Implementors are immutable; "changing" one means building a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
