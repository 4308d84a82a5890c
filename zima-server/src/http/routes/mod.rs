//! Route handlers by page

pub mod data;
pub mod health;
pub mod index;
pub mod login;
pub mod socket;
