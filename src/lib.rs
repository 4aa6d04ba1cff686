pub mod config;
pub mod entities;
pub mod helpers;
pub mod rl;
pub mod states;
