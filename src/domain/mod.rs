pub mod gesture;
pub mod models;
pub mod slot_grid;
