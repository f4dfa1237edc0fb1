pub mod client;
pub mod cmd;
pub mod logwriter;
pub mod metrics;
pub mod partition;
pub mod reader;
pub mod request;
pub mod worker;

#[cfg(test)]
pub mod testutil;
