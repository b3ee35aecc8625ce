use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("invalid IPv4 prefix in mapping entry '{entry}': {source}")]
    InvalidPrefix {
        entry: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("invalid IPv6 address in mapping entry '{entry}': {source}")]
    InvalidAddress {
        entry: String,
        #[source]
        source: std::net::AddrParseError,
    },
}
