mod demo;
mod http;

pub use demo::DemoBackend;
pub use http::HttpBackend;
