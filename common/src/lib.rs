mod db;
mod error;
mod helpers;
mod ledger;
mod schema;

pub use db::*;
pub use error::*;
pub use helpers::*;
pub use ledger::*;
pub use schema::*;
