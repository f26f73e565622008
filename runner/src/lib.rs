pub mod cli;
pub mod collector;
pub mod config;
pub mod distributed;
pub mod executors;
