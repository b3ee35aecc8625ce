pub mod packet_filter;
pub mod runtime;
