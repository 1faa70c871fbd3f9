mod collection;
mod id;
mod db;

pub use collection::{Coll, StoreCollection};
pub use id::{Id, ParseIdError};
pub use db::{Store, Txn};
