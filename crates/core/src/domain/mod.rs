pub mod chain;
pub mod identity;
pub mod scope;
pub mod tier;
pub mod transaction;
