//! Typed view descriptors for the CareCloud dashboard.
//!
//! The dashboard shows one table and one set of modals per entity kind. This
//! crate describes them as data so every shell renders the same columns,
//! fields and validation messages:
//!
//! - [`entity`]: entity kinds and their table columns
//! - [`form`]: modal content for create / update / delete actions
//! - [`schema`]: resident form validation into a [`NewResident`] payload
//!
//! [`NewResident`]: carecloud_core::models::NewResident

pub mod entity;
pub mod form;
pub mod schema;

pub use entity::*;
pub use form::*;
pub use schema::*;
