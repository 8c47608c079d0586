pub use super::locks::Entity as Locks;
pub use super::values::Entity as Values;
