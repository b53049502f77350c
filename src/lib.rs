//! Tails log files, parses each line into a [`source::Record`] and stores
//! the records through a [`storage::Repository`].

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod source;
pub mod storage;
