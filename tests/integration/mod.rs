#[path = "../common/mod.rs"]
mod common;

mod fetch_limit;
mod flush_queues;
mod graceful_drain;
mod master_worker;
