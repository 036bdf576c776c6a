pub mod install;
pub mod report;
pub mod web_addr;
