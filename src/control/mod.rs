//! Control plane: messages and the coordinator that fans them out.

pub mod coordinator;
pub mod message;
