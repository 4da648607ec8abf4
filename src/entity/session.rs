//! Session entity model for Sea-ORM database interaction.
//!
//! Maps the `session` table read by [`SeaOrmDatabase`](crate::SeaOrmDatabase).

use sea_orm::entity::prelude::*;

/// A persisted session row.
///
/// | Column      | Type                    | Description                       |
/// |-------------|-------------------------|-----------------------------------|
/// | id          | TEXT (Primary Key)      | Session token                     |
/// | data        | BYTEA / BLOB            | MessagePack `Record`              |
/// | expiry_date | TIMESTAMPTZ             | Session expiration timestamp      |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "session")]
pub struct Model {
    /// The session token, as carried by the cookie.
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    /// MessagePack encoding of a `tower_sessions::session::Record`.
    pub data: Vec<u8>,

    pub expiry_date: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
