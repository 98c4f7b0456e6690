//! Per-server waiting queues and the processing loops that drain them.

pub mod game_server;
pub mod queue;
pub mod service;
