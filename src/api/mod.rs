//! Collaborators the service consumes: file storage, session tokens and password handling.

pub mod blob_store;
pub mod passwords;
pub mod tokens;
