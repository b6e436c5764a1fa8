pub mod api;
pub mod config;
pub mod fetch;
pub mod retention;
pub mod run;
pub mod source;
