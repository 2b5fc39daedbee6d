pub mod archive;
pub mod cli;
pub mod config;
pub mod metrics;
pub mod model;
pub mod storage;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
