//! `SeaORM` entities for the lab database.

pub mod measurements;
pub mod users;

pub mod prelude {
    pub use super::measurements::Entity as Measurements;
    pub use super::users::Entity as Users;
}
