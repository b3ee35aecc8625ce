mod client;

pub use client::DockerRuntime;
