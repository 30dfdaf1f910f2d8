//! Version and endpoint discovery of remote parties

mod client;

pub use client::{DiscoveryOptions, VersionDiscoveryClient};
