//! Role and permission based access control.
//!
//! [`Permission`] is an arbitrary-width bitmask. [`RbacEngine`] resolves a
//! subject's permissions and roles through a consumer [`Manager`], caching
//! every lookup and collapsing concurrent misses for the same key into one
//! upstream call.

mod engine;
mod error;
mod manager;
mod permission;
mod policy;
mod singleflight;

pub use engine::{RbacEngine, SubjectAccess};
pub use error::RbacError;
pub use manager::{
    DEFAULT_ROLE_PERMISSIONS_TTL, DEFAULT_SUBJECT_PERMISSIONS_TTL, DEFAULT_SUBJECT_ROLES_TTL,
    Manager,
};
pub use permission::{Permission, Permissions, marshal_binary, marshal_text};
pub use policy::{RbacPolicy, Requirement};
pub use singleflight::SingleFlight;

pub const SUBJECT_PERMISSIONS_PREFIX: &str = "subject_perms:";
pub const SUBJECT_ROLES_PREFIX: &str = "subject_roles:";
pub const ROLE_PERMISSIONS_PREFIX: &str = "role_perms:";
pub const SUBJECT_SINGLE_FLIGHT_PREFIX: &str = "subject_sf:";
pub const ROLE_SINGLE_FLIGHT_PREFIX: &str = "role_sf:";
