pub mod cache;
pub mod completions;
pub mod console;
pub mod get_cred;
pub mod setup;
