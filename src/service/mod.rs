//! Collaborator implementations backed by PostgreSQL.

mod crud;

pub use crud::PgEntityStore;
