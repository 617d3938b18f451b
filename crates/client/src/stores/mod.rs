pub mod satellites;
pub mod tiles;
