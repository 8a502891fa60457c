pub mod config;
pub mod core;
pub mod edw;
pub mod kubernetes;
