//! Definition of structures and functions,
//! which are shared by [boxes][crate::boxes] and [transports][crate::transport].

pub mod format;
pub mod handler;
pub mod message;
