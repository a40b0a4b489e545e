pub mod core;

pub use self::core::{connect, connect_or_create, orchestrate_migration};
