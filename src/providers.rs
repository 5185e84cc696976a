//! Production wiring of the orchestrator's collaborator seams: Chromium
//! pages and chat-completions agents. Tests substitute their own fakes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use runcast_agent::{AgentError, AutomationAgent, ChatAgent, ChatAgentConfig};
use runcast_browser::{ChromiumDriver, ChromiumPage, DriverError, DriverPage, LaunchOptions};

use crate::orchestrator::{AgentFactory, PageLease, PageProvider};

/// Launches one Chromium process per run and hands out its first tab.
pub struct ChromiumPageProvider {
    options: LaunchOptions,
}

impl ChromiumPageProvider {
    pub fn new(options: LaunchOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl PageProvider for ChromiumPageProvider {
    async fn acquire(&self) -> Result<Arc<dyn PageLease>, DriverError> {
        let driver = ChromiumDriver::launch(self.options.clone()).await?;
        let page = match driver.new_page().await {
            Ok(page) => page,
            Err(err) => {
                if let Err(close_err) = driver.close().await {
                    debug!(target: "provider", %close_err, "browser cleanup after failed page open");
                }
                return Err(err);
            }
        };
        Ok(Arc::new(ChromiumLease {
            driver,
            page: Arc::new(page),
        }))
    }
}

struct ChromiumLease {
    driver: ChromiumDriver,
    page: Arc<ChromiumPage>,
}

#[async_trait]
impl PageLease for ChromiumLease {
    fn page(&self) -> Arc<dyn DriverPage> {
        self.page.clone()
    }

    async fn close(&self) {
        if let Err(err) = self.page.close().await {
            debug!(target: "provider", %err, "page close failed");
        }
        if let Err(err) = self.driver.close().await {
            debug!(target: "provider", %err, "browser close failed");
        }
    }
}

/// Builds a [`ChatAgent`] per run against one configured endpoint.
pub struct ChatAgentFactory {
    api_base: String,
    api_key: String,
}

impl ChatAgentFactory {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }
}

impl AgentFactory for ChatAgentFactory {
    fn agent_for(
        &self,
        model: &str,
        instructions: &str,
    ) -> Result<Arc<dyn AutomationAgent>, AgentError> {
        let config = ChatAgentConfig::new(&self.api_base, &self.api_key, model);
        Ok(Arc::new(ChatAgent::new(config, instructions)?))
    }
}
