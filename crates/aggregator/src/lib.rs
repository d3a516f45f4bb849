pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod fanout;
pub mod http;
pub mod metrics;
pub mod service;
pub mod source;
pub mod subject;
pub mod unify;
pub mod upstream;

#[cfg(test)]
mod testing;
