pub mod remote_api;
pub mod status_sink;
