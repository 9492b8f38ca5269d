pub mod archive;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod output;
pub mod runner;

pub use fetcher::{DatasetFetcher, FetchOptions, FetchOutcome, download};
