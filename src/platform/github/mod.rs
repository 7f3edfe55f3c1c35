mod client;
mod mapper;

pub use client::GitHubFetcher;
