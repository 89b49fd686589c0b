//! Primitive values shared by the page interface and provider profiles.

use serde::{Deserialize, Serialize};

/// Load-stability criterion for navigations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
	/// The `load` event fired
	Load,
	/// The `DOMContentLoaded` event fired
	#[serde(rename = "domcontentloaded")]
	DomContentLoaded,
	/// No network connections for at least 500ms
	#[serde(rename = "networkidle")]
	NetworkIdle,
	/// No more than two network connections for at least 500ms
	#[default]
	#[serde(rename = "networkalmostidle")]
	NetworkAlmostIdle,
}

impl WaitUntil {
	/// Name of the `Page.lifecycleEvent` that satisfies this criterion.
	pub fn lifecycle_event(self) -> &'static str {
		match self {
			WaitUntil::Load => "load",
			WaitUntil::DomContentLoaded => "DOMContentLoaded",
			WaitUntil::NetworkIdle => "networkIdle",
			WaitUntil::NetworkAlmostIdle => "networkAlmostIdle",
		}
	}
}

/// Fixed page viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
	/// Width in CSS pixels
	pub width: u32,
	/// Height in CSS pixels
	pub height: u32,
}

impl Default for Viewport {
	fn default() -> Self {
		Self {
			width: 1280,
			height: 720,
		}
	}
}
