//! Frame production for live viewers.
//!
//! Two capture strategies behind one start call: drivers that support
//! high-frequency capture get a ~10 fps JPEG loop; everything else falls back
//! to lossless PNG polling at a lower rate. Capture failures are expected
//! under navigation races and never end the stream; only failing to pin the
//! viewport surfaces at start time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

use runcast_browser::{DriverError, DriverPage};
use runcast_core_types::{FrameImage, RunEvent, RunId};
use runcast_event_bus::EventBus;

pub const POLLING_INTERVAL_FLOOR: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct ScreencastOptions {
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Tick period for the fast JPEG strategy.
    pub protocol_interval: Duration,
    /// Tick period for the PNG fallback, floored at 100ms.
    pub polling_interval: Duration,
    pub jpeg_quality: u32,
}

impl Default for ScreencastOptions {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 800,
            protocol_interval: Duration::from_millis(100),
            polling_interval: Duration::from_millis(250),
            jpeg_quality: 60,
        }
    }
}

impl ScreencastOptions {
    /// Build options from frames-per-second rates. Zero counts as one; the
    /// 100ms polling floor still applies at start time.
    pub fn with_rates(protocol_fps: u32, polling_fps: u32) -> Self {
        Self {
            protocol_interval: Duration::from_millis(1000 / u64::from(protocol_fps.max(1))),
            polling_interval: Duration::from_millis(1000 / u64::from(polling_fps.max(1))),
            ..Self::default()
        }
    }
}

/// Stop handle returned by [`start`]. Stopping raises a flag that prevents
/// further capture scheduling; an in-flight capture finishes on its own.
pub struct ScreencastHandle {
    stop: Arc<AtomicBool>,
    observers: Vec<JoinHandle<()>>,
}

impl ScreencastHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        for task in &self.observers {
            task.abort();
        }
    }
}

/// Pin the viewport, start the capture loop matching the driver's
/// capability, and forward the page's navigation/console notifications as
/// events.
pub async fn start(
    bus: Arc<EventBus>,
    run_id: RunId,
    page: Arc<dyn DriverPage>,
    options: ScreencastOptions,
) -> Result<ScreencastHandle, DriverError> {
    page.fix_viewport(options.viewport_width, options.viewport_height)
        .await?;

    let stop = Arc::new(AtomicBool::new(false));
    let fast = page.supports_fast_capture();
    let period = if fast {
        options.protocol_interval
    } else {
        options.polling_interval.max(POLLING_INTERVAL_FLOOR)
    };
    debug!(target: "screencast", run = %run_id, fast, period_ms = period.as_millis() as u64, "capture loop starting");

    {
        let bus = bus.clone();
        let run_id = run_id.clone();
        let page = page.clone();
        let stop = stop.clone();
        let quality = options.jpeg_quality;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let captured = if fast {
                    page.capture_jpeg(quality).await.map(|bytes| FrameImage::Jpeg(BASE64.encode(bytes)))
                } else {
                    page.capture_png().await.map(|bytes| FrameImage::Png(BASE64.encode(bytes)))
                };
                match captured {
                    Ok(image) => bus.publish(&run_id, RunEvent::Frame { image }),
                    // Mid-navigation captures fail routinely; next tick retries.
                    Err(err) => trace!(target: "screencast", run = %run_id, %err, "capture skipped"),
                }
            }
            debug!(target: "screencast", run = %run_id, "capture loop stopped");
        });
    }

    let mut observers = Vec::new();
    match page.navigations().await {
        Ok(mut navigations) => {
            let bus = bus.clone();
            let run_id = run_id.clone();
            observers.push(tokio::spawn(async move {
                while let Some(url) = navigations.next().await {
                    bus.publish(
                        &run_id,
                        RunEvent::AgentNavigation {
                            url,
                            timestamp: chrono::Utc::now(),
                        },
                    );
                }
            }));
        }
        Err(err) => debug!(target: "screencast", run = %run_id, %err, "navigation observer unavailable"),
    }
    match page.consoles().await {
        Ok(mut consoles) => {
            let bus = bus.clone();
            let run_id = run_id.clone();
            observers.push(tokio::spawn(async move {
                while let Some(notice) = consoles.next().await {
                    bus.publish(
                        &run_id,
                        RunEvent::AgentConsole {
                            level: notice.level,
                            text: notice.text,
                            timestamp: chrono::Utc::now(),
                        },
                    );
                }
            }));
        }
        Err(err) => debug!(target: "screencast", run = %run_id, %err, "console observer unavailable"),
    }

    Ok(ScreencastHandle { stop, observers })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_convert_to_tick_periods() {
        let options = ScreencastOptions::with_rates(10, 4);
        assert_eq!(options.protocol_interval, Duration::from_millis(100));
        assert_eq!(options.polling_interval, Duration::from_millis(250));
    }

    #[test]
    fn zero_rates_are_treated_as_one() {
        let options = ScreencastOptions::with_rates(0, 0);
        assert_eq!(options.protocol_interval, Duration::from_secs(1));
        assert_eq!(options.polling_interval, Duration::from_secs(1));
    }

    #[test]
    fn aggressive_polling_rates_hit_the_floor_at_start() {
        let options = ScreencastOptions::with_rates(10, 40);
        assert_eq!(options.polling_interval, Duration::from_millis(25));
        assert_eq!(
            options.polling_interval.max(POLLING_INTERVAL_FLOOR),
            POLLING_INTERVAL_FLOOR
        );
    }
}
