pub mod history;
pub mod item;
pub mod signal;
pub mod weather;
