pub mod config_parser;
pub mod map;
pub mod vector;
