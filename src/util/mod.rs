pub mod csource;
pub mod dual_map;
pub mod file;
pub mod listing;
pub mod rewrite;
pub mod stack;
