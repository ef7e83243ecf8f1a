//! NextGCore Core Library
//!
//! Shared building blocks for the NextGCore network functions. The event
//! loops drive every protocol timer through [`TimerMgr`], which keeps the
//! nearest deadline at hand and hands back expired timers as plain data.

pub mod timer;

pub use timer::{TimerId, TimerMgr};
