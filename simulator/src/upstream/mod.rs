pub mod http;

pub use http::HttpFrameSource;
