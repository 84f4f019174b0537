//! Shared protocol definitions for the Taskwire gateway wire format.

pub mod error;
pub mod notification;
pub mod stream;
pub mod task;
pub mod topic;
