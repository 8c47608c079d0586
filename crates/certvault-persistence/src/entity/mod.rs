//! `SeaORM` entities for the two certificate store tables

pub mod locks;
pub mod prelude;
pub mod values;
