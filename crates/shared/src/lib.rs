pub mod cluster;
pub mod mercator;
pub mod models;
