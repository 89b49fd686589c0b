//! Translation of raw DevTools events into page state.
//!
//! One pump task per page reads the connection's event stream, keeps the ones
//! addressed to the page's session, and:
//! - folds main-frame `Page.lifecycleEvent`s into a [`LoadState`]
//! - pairs `Network.requestWillBeSent` with `loadingFailed`/`loadingFinished`
//!   to emit [`NavigationEvent`]s

use std::collections::{HashMap, HashSet};

use codecap_runtime::Event;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{broadcast, watch};

use crate::browser::NavigationEvent;

/// Lifecycle progress of the main frame's current document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LoadState {
	/// Loader of the current document.
	pub loader_id: Option<String>,
	/// Bumped whenever a new loader starts.
	pub generation: u64,
	/// Lifecycle event names reached by the current loader.
	pub reached: HashSet<String>,
}

impl LoadState {
	/// Records one lifecycle event.
	pub fn apply(&mut self, loader_id: &str, name: &str) {
		if name == "init" || self.loader_id.as_deref() != Some(loader_id) {
			self.loader_id = Some(loader_id.to_string());
			self.generation += 1;
			self.reached.clear();
		}
		self.reached.insert(name.to_string());
	}

	pub fn has_reached(&self, name: &str) -> bool {
		self.reached.contains(name)
	}

	/// Loader `loader_id` has reached lifecycle event `name`.
	pub fn loader_reached(&self, loader_id: &str, name: &str) -> bool {
		self.loader_id.as_deref() == Some(loader_id) && self.has_reached(name)
	}
}

/// State shared between a page and its event pump.
pub(crate) struct PageShared {
	pub load: watch::Sender<LoadState>,
	/// Taken on close so subscribers see the stream end.
	pub navigation: Mutex<Option<broadcast::Sender<NavigationEvent>>>,
	pub stop: watch::Sender<bool>,
}

impl PageShared {
	pub fn new(capacity: usize) -> Self {
		let (load, _) = watch::channel(LoadState::default());
		let (navigation, _) = broadcast::channel(capacity);
		let (stop, _) = watch::channel(false);
		Self {
			load,
			navigation: Mutex::new(Some(navigation)),
			stop,
		}
	}

	pub fn emit(&self, event: NavigationEvent) {
		if let Some(tx) = self.navigation.lock().as_ref() {
			let _ = tx.send(event);
		}
	}

	/// Ends the navigation stream and stops the pump.
	pub fn shut_down(&self) {
		self.navigation.lock().take();
		self.stop.send_replace(true);
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifecycleParams {
	frame_id: String,
	loader_id: String,
	name: String,
}

#[derive(Deserialize)]
struct RequestInfo {
	url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestWillBeSent {
	request_id: String,
	request: RequestInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadingFailed {
	request_id: String,
	#[serde(default)]
	error_text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadingFinished {
	request_id: String,
}

/// Per-page event translator.
pub(crate) struct EventPump {
	session_id: String,
	target_id: String,
	/// Request id to most recent URL; redirects reuse the id.
	requests: HashMap<String, String>,
}

impl EventPump {
	pub fn new(session_id: String, target_id: String) -> Self {
		Self {
			session_id,
			target_id,
			requests: HashMap::new(),
		}
	}

	/// Runs until the connection's event stream ends or the page shuts down.
	pub async fn run(mut self, mut events: broadcast::Receiver<Event>, shared: std::sync::Arc<PageShared>) {
		let mut stop = shared.stop.subscribe();
		loop {
			if *stop.borrow_and_update() {
				break;
			}
			tokio::select! {
				event = events.recv() => match event {
					Ok(event) => self.handle(&event, &shared),
					Err(broadcast::error::RecvError::Lagged(n)) => {
						tracing::warn!(dropped = n, session = %self.session_id, "Page event pump lagged");
					}
					Err(broadcast::error::RecvError::Closed) => break,
				},
				changed = stop.changed() => {
					if changed.is_err() {
						break;
					}
				}
			}
		}
		shared.navigation.lock().take();
		tracing::trace!(session = %self.session_id, "Page event pump stopped");
	}

	/// Applies one event.
	pub fn handle(&mut self, event: &Event, shared: &PageShared) {
		if event.session_id.as_deref() != Some(self.session_id.as_str()) {
			return;
		}

		match event.method.as_str() {
			"Page.lifecycleEvent" => {
				let Ok(params) = serde_json::from_value::<LifecycleParams>(event.params.clone()) else {
					return;
				};
				if params.frame_id != self.target_id {
					return;
				}
				tracing::trace!(loader = %params.loader_id, name = %params.name, "Lifecycle");
				shared.load.send_modify(|state| state.apply(&params.loader_id, &params.name));
			}
			"Network.requestWillBeSent" => {
				if let Ok(params) = serde_json::from_value::<RequestWillBeSent>(event.params.clone()) {
					self.requests.insert(params.request_id, params.request.url);
				}
			}
			"Network.loadingFailed" => {
				let Ok(params) = serde_json::from_value::<LoadingFailed>(event.params.clone()) else {
					return;
				};
				if let Some(url) = self.requests.remove(&params.request_id) {
					shared.emit(NavigationEvent::failed(url, params.error_text));
				}
			}
			"Network.loadingFinished" => {
				let Ok(params) = serde_json::from_value::<LoadingFinished>(event.params.clone()) else {
					return;
				};
				if let Some(url) = self.requests.remove(&params.request_id) {
					shared.emit(NavigationEvent::succeeded(url));
				}
			}
			_ => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn event(method: &str, params: serde_json::Value) -> Event {
		Event {
			method: method.to_string(),
			params,
			session_id: Some("S1".to_string()),
		}
	}

	fn pump() -> (EventPump, PageShared) {
		(EventPump::new("S1".into(), "T1".into()), PageShared::new(16))
	}

	#[test]
	fn new_loader_resets_reached_events() {
		let mut state = LoadState::default();
		state.apply("L1", "init");
		state.apply("L1", "DOMContentLoaded");
		state.apply("L1", "load");
		assert!(state.loader_reached("L1", "load"));
		assert_eq!(state.generation, 1);

		state.apply("L2", "init");
		assert!(!state.has_reached("load"));
		assert!(!state.loader_reached("L1", "load"));
		assert_eq!(state.generation, 2);
	}

	#[test]
	fn failed_request_emits_latest_url() {
		let (mut pump, shared) = pump();
		let mut rx = shared.navigation.lock().as_ref().unwrap().subscribe();

		pump.handle(
			&event("Network.requestWillBeSent", json!({"requestId": "R1", "request": {"url": "https://idp.example.com/authorize"}})),
			&shared,
		);
		pump.handle(
			&event("Network.requestWillBeSent", json!({"requestId": "R1", "request": {"url": "mym://callback?code=ABC"}})),
			&shared,
		);
		pump.handle(
			&event("Network.loadingFailed", json!({"requestId": "R1", "errorText": "net::ERR_UNKNOWN_URL_SCHEME"})),
			&shared,
		);

		let emitted = rx.try_recv().unwrap();
		assert_eq!(emitted, NavigationEvent::failed("mym://callback?code=ABC", "net::ERR_UNKNOWN_URL_SCHEME"));
	}

	#[test]
	fn finished_request_emits_success() {
		let (mut pump, shared) = pump();
		let mut rx = shared.navigation.lock().as_ref().unwrap().subscribe();

		pump.handle(
			&event("Network.requestWillBeSent", json!({"requestId": "R2", "request": {"url": "https://idp.example.com/app.js"}})),
			&shared,
		);
		pump.handle(&event("Network.loadingFinished", json!({"requestId": "R2"})), &shared);

		assert!(!rx.try_recv().unwrap().is_failed());
	}

	#[test]
	fn other_sessions_and_frames_are_ignored() {
		let (mut pump, shared) = pump();

		let mut foreign = event("Page.lifecycleEvent", json!({"frameId": "T1", "loaderId": "L1", "name": "load"}));
		foreign.session_id = Some("S2".into());
		pump.handle(&foreign, &shared);

		pump.handle(
			&event("Page.lifecycleEvent", json!({"frameId": "child", "loaderId": "L9", "name": "load"})),
			&shared,
		);

		assert_eq!(shared.load.borrow().generation, 0);

		pump.handle(
			&event("Page.lifecycleEvent", json!({"frameId": "T1", "loaderId": "L1", "name": "init"})),
			&shared,
		);
		assert_eq!(shared.load.borrow().generation, 1);
	}

	#[test]
	fn shut_down_ends_navigation_stream() {
		let shared = PageShared::new(4);
		let mut rx = shared.navigation.lock().as_ref().unwrap().subscribe();
		shared.shut_down();
		assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Closed)));
	}
}
