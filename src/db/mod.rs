pub mod dbpresence;

pub use dbpresence::PgPresenceStore;
