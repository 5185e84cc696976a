use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::DriverError;

/// Console message observed on a driven page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleNotice {
    pub level: String,
    pub text: String,
}

/// One live browser page the orchestrator drives and observes.
///
/// Capture methods return encoded image bytes; the caller decides transport
/// encoding. `supports_fast_capture` gates whether a high-rate capture loop is
/// worth scheduling against this driver.
#[async_trait]
pub trait DriverPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Current serialized DOM, used as planner context.
    async fn content(&self) -> Result<String, DriverError>;

    /// Pin the viewport so captured frames keep a stable geometry.
    async fn fix_viewport(&self, width: u32, height: u32) -> Result<(), DriverError>;

    async fn capture_jpeg(&self, quality: u32) -> Result<Vec<u8>, DriverError>;

    async fn capture_png(&self) -> Result<Vec<u8>, DriverError>;

    fn supports_fast_capture(&self) -> bool;

    /// Stream of top-frame navigation URLs, ending when the page closes.
    async fn navigations(&self) -> Result<BoxStream<'static, String>, DriverError>;

    /// Stream of console messages emitted by the page.
    async fn consoles(&self) -> Result<BoxStream<'static, ConsoleNotice>, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}
