pub mod client;

pub use client::{RemoteClient, RemoteClientConfig, RemoteClientError, RemotePage};
