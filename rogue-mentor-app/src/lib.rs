pub mod config;
pub mod panels;
pub mod repl;
