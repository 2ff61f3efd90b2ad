//! Shared data model and wire protocol for `taskday`.

pub mod codec;
pub mod notification;
pub mod protocol;
pub mod store;
pub mod task;
