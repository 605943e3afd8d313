pub mod completions;
pub mod config;
pub mod init;
pub mod stack;
