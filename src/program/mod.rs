pub mod agents;
pub mod atomics;
pub mod crew;
pub mod errors;
pub mod executor;
pub mod models;
pub mod tasks;
