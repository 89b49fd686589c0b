//! Chrome DevTools Protocol implementation of the browser interface.
//!
//! Every [`CdpBackend::acquire`] opens its own WebSocket to the remote browser
//! and creates a fresh target on it, so concurrent sessions share nothing.

mod events;
mod input;
mod page;

use async_trait::async_trait;
use codecap_runtime::{BrowserEndpoint, Result};

pub use self::page::CdpPage;
use crate::browser::{BrowserBackend, BrowserPage};

/// [`BrowserBackend`] backed by a remote DevTools endpoint.
#[derive(Debug, Clone)]
pub struct CdpBackend {
	endpoint: BrowserEndpoint,
}

impl CdpBackend {
	pub fn new(endpoint: BrowserEndpoint) -> Self {
		Self { endpoint }
	}

	pub fn endpoint(&self) -> &BrowserEndpoint {
		&self.endpoint
	}
}

#[async_trait]
impl BrowserBackend for CdpBackend {
	async fn acquire(&self) -> Result<Box<dyn BrowserPage>> {
		let (connection, _run) = self.endpoint.connect().await?;
		match CdpPage::open(connection.clone()).await {
			Ok(page) => Ok(Box::new(page)),
			Err(err) => {
				connection.close();
				Err(err)
			}
		}
	}
}
