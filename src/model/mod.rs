pub mod election;
pub mod identity;
pub mod session;
pub mod store;
pub mod vote;
