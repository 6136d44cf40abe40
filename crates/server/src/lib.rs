pub mod api;
pub mod bootstrap;
pub mod fetchers;
pub mod health;
pub mod logging;
pub mod scheduler;
