//! Database entity models read by [`SeaOrmDatabase`](crate::SeaOrmDatabase).

/// The `session` table.
pub mod session;
