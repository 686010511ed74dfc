pub mod create;
pub mod delete;
pub mod get;
pub mod limiter;
pub mod ownership;
pub mod patch;
pub mod protocol;
pub mod routes;
pub mod store;
pub mod thread;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;
