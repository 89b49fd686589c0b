//! Keyboard and mouse input for [`CdpPage`].

use std::time::Duration;

use codecap_runtime::{Error, Result};
use serde_json::{Value, json};

use super::page::CdpPage;

/// Encodes `selector` as a JavaScript string literal.
fn js_string(selector: &str) -> Result<String> {
	Ok(serde_json::to_string(selector)?)
}

/// Expression that is `true` when `selector` matches an element.
pub(crate) fn selector_probe(selector: &str) -> Result<String> {
	Ok(format!("document.querySelector({}) !== null", js_string(selector)?))
}

/// Focuses the first element matching `selector`.
pub(crate) async fn focus(page: &CdpPage, selector: &str) -> Result<()> {
	let script = format!(
		"(() => {{ const el = document.querySelector({}); if (!el) return false; el.focus(); return true; }})()",
		js_string(selector)?
	);
	match page.evaluate(&script).await? {
		Value::Bool(true) => Ok(()),
		_ => Err(Error::ElementNotFound(selector.to_string())),
	}
}

/// Types `text` into the focused element, pausing `delay` between characters.
pub(crate) async fn type_characters(page: &CdpPage, text: &str, delay: Duration) -> Result<()> {
	let mut chars = text.chars().peekable();
	let mut buf = [0u8; 4];
	while let Some(ch) = chars.next() {
		let key: &str = ch.encode_utf8(&mut buf);
		page.dispatch_input(
			"Input.dispatchKeyEvent",
			json!({ "type": "keyDown", "key": key, "text": key, "unmodifiedText": key }),
		)
		.await?;
		page.dispatch_input("Input.dispatchKeyEvent", json!({ "type": "keyUp", "key": key }))
			.await?;

		if chars.peek().is_some() && !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
	}
	Ok(())
}

/// Scrolls the element into view and returns the viewport coordinates of its centre.
pub(crate) async fn element_center(page: &CdpPage, selector: &str) -> Result<(f64, f64)> {
	let script = format!(
		"(() => {{ \
			const el = document.querySelector({}); \
			if (!el) return null; \
			el.scrollIntoView({{ block: 'center', inline: 'center' }}); \
			const r = el.getBoundingClientRect(); \
			return {{ x: r.left + r.width / 2, y: r.top + r.height / 2 }}; \
		}})()",
		js_string(selector)?
	);

	let value = page.evaluate(&script).await?;
	match (value.get("x").and_then(Value::as_f64), value.get("y").and_then(Value::as_f64)) {
		(Some(x), Some(y)) => Ok((x, y)),
		_ => Err(Error::ElementNotFound(selector.to_string())),
	}
}

/// Moves the mouse to `(x, y)` and clicks the left button once.
pub(crate) async fn click_at(page: &CdpPage, x: f64, y: f64) -> Result<()> {
	page.dispatch_input("Input.dispatchMouseEvent", json!({ "type": "mouseMoved", "x": x, "y": y }))
		.await?;
	for kind in ["mousePressed", "mouseReleased"] {
		page.dispatch_input(
			"Input.dispatchMouseEvent",
			json!({ "type": kind, "x": x, "y": y, "button": "left", "clickCount": 1 }),
		)
		.await?;
	}
	Ok(())
}
