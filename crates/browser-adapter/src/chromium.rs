use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, EventFrameNavigated};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{DriverError, DriverErrorKind};
use crate::page::{ConsoleNotice, DriverPage};

#[derive(Clone, Debug)]
pub struct LaunchOptions {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 800,
        }
    }
}

/// Owns one Chromium process. The CDP message pump runs on a background task
/// for the lifetime of the driver.
pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
}

impl ChromiumDriver {
    pub async fn launch(options: LaunchOptions) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.window_width, options.window_height)
            .no_sandbox();
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(|err| {
            DriverError::new(DriverErrorKind::Internal)
                .with_hint(format!("invalid browser config: {err}"))
        })?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| map_cdp_error(err).with_hint("failed to launch Chromium"))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(target: "browser", %err, "cdp handler stopped");
                    break;
                }
            }
            debug!(target: "browser", "cdp message pump finished");
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
        })
    }

    pub async fn new_page(&self) -> Result<ChromiumPage, DriverError> {
        let browser = self.browser.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(map_cdp_error)?;
        Ok(ChromiumPage { page })
    }

    pub async fn close(&self) -> Result<(), DriverError> {
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(map_cdp_error)?;
        if let Err(err) = browser.wait().await {
            debug!(target: "browser", %err, "browser exited uncleanly");
        }
        self.handler_task.abort();
        Ok(())
    }
}

/// One Chromium tab driven over CDP.
#[derive(Clone)]
pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl DriverPage for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.page.goto(url).await.map_err(|err| match err {
            CdpError::Timeout => DriverError::new(DriverErrorKind::NavTimeout)
                .with_hint(url.to_string())
                .retriable(true),
            other => map_cdp_error(other),
        })?;
        Ok(())
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page.content().await.map_err(map_cdp_error)
    }

    async fn fix_viewport(&self, width: u32, height: u32) -> Result<(), DriverError> {
        let params = SetDeviceMetricsOverrideParams::new(width as i64, height as i64, 1.0, false);
        self.page.execute(params).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn capture_jpeg(&self, quality: u32) -> Result<Vec<u8>, DriverError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(quality as i64)
            .full_page(false)
            .build();
        self.page.screenshot(params).await.map_err(|err| {
            DriverError::new(DriverErrorKind::CaptureFailed)
                .with_hint(err.to_string())
                .retriable(true)
        })
    }

    async fn capture_png(&self) -> Result<Vec<u8>, DriverError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        self.page.screenshot(params).await.map_err(|err| {
            DriverError::new(DriverErrorKind::CaptureFailed)
                .with_hint(err.to_string())
                .retriable(true)
        })
    }

    fn supports_fast_capture(&self) -> bool {
        true
    }

    async fn navigations(&self) -> Result<BoxStream<'static, String>, DriverError> {
        let events = self
            .page
            .event_listener::<EventFrameNavigated>()
            .await
            .map_err(map_cdp_error)?;
        // Child frames navigate constantly; only the top frame is interesting.
        let stream = events
            .filter_map(|event: Arc<EventFrameNavigated>| async move {
                if event.frame.parent_id.is_none() {
                    Some(event.frame.url.clone())
                } else {
                    None
                }
            })
            .boxed();
        Ok(stream)
    }

    async fn consoles(&self) -> Result<BoxStream<'static, ConsoleNotice>, DriverError> {
        let events = self
            .page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(map_cdp_error)?;
        let stream = events
            .map(|event: Arc<EventConsoleApiCalled>| ConsoleNotice {
                level: console_level(&event),
                text: console_text(&event),
            })
            .boxed();
        Ok(stream)
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.page.clone().close().await.map_err(map_cdp_error)?;
        Ok(())
    }
}

fn console_level(event: &EventConsoleApiCalled) -> String {
    serde_json::to_value(&event.r#type)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "log".to_string())
}

fn console_text(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .map(|arg| {
            arg.value
                .as_ref()
                .map(|value| match value {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .or_else(|| arg.description.clone())
                .unwrap_or_default()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn map_cdp_error(err: CdpError) -> DriverError {
    DriverError::new(DriverErrorKind::Io).with_hint(err.to_string())
}
