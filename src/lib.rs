pub mod config;
pub mod database;
pub mod error;
pub mod grouper;
pub mod headers;
pub mod materializer;
pub mod models;
pub mod parser;
pub mod resolver;
pub mod server;
pub mod store;
pub mod tokenizer;
pub mod tracker;
