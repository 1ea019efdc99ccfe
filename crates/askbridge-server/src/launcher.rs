//! Opens the options page in the user's browser.

use askbridge_broker::OptionsLauncher;
use askbridge_core::Result;
use tracing::info;

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    url: String,
}

impl BrowserLauncher {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl OptionsLauncher for BrowserLauncher {
    fn open_options_page(&self) -> Result<()> {
        info!("Opening options page: {}", self.url);
        Ok(open::that_detached(&self.url)?)
    }
}
