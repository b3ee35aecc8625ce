mod cli;

pub use cli::{Family, NetfilterCli};
