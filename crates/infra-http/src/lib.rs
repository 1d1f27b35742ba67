// AuditDesk Infrastructure - HTTP Adapters
// Implements: CrawlerGateway, RenderDispatcher

mod crawler_gateway;
mod error;
mod render_dispatcher;

pub use crawler_gateway::{CrawlerConfig, HttpCrawlerGateway};
pub use render_dispatcher::{HttpRenderDispatcher, RenderWorkerConfig};
