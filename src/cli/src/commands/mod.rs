pub mod policy;
pub mod roles;
