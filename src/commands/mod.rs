pub mod completions;
pub mod config;
pub mod generate;
pub mod object;
pub mod traits;
pub mod watch;
