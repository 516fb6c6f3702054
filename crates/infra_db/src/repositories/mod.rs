//! Repository implementations
//!
//! Repositories encapsulate the SQL and map between database rows and
//! domain types. Statements that must share a transaction with other
//! writes take a `PgConnection` instead of using the pool.

pub mod claims;
pub mod events;
pub mod organizations;

pub use claims::ClaimsRepository;
pub use events::EventsRepository;
pub use organizations::OrganizationsRepository;
