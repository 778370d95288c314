pub mod bucket_sweeper;
pub mod http_client;
pub mod http_handler;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use bucket_sweeper::BucketSweeper;
pub use http_client::HttpClientAdapter;
pub use http_handler::{HttpHandler, build_router};
pub use middleware::*;
