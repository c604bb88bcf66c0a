//! Session command surface against an in-process fake debugging endpoint.
//!
//! The fake serves `/json/version` over HTTP and speaks just enough of the
//! DOM, Runtime, Input, and Page domains over WebSocket to exercise every
//! session command.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::routing::get;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use grid::GridError;
use grid::session::SessionClient;
use grid_protocol::BrowserKind;
use grid_runtime::Container;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const FAKE_PAGE_URL: &str = "https://example.com/";
const FAKE_SCREENSHOT: &[u8] = b"not-actually-a-png";

struct FakeBrowser {
	http_port: u16,
	/// Every command the endpoint received, in order.
	commands: Arc<Mutex<Vec<(String, Value)>>>,
	/// How often `#late` has been queried; it resolves from the third try.
	late_queries: Arc<AtomicUsize>,
}

impl FakeBrowser {
	fn container(&self) -> Container {
		Container {
			id: "browser-chrome-fake-0001".to_string(),
			kind: BrowserKind::Chrome,
			host: "127.0.0.1".to_string(),
			port: self.http_port,
			pid: 4242,
			prewarmed: false,
			created_at: std::time::SystemTime::now(),
		}
	}

	fn received(&self, method: &str) -> Vec<Value> {
		self.commands
			.lock()
			.iter()
			.filter(|(m, _)| m == method)
			.map(|(_, params)| params.clone())
			.collect()
	}
}

async fn spawn_fake_browser() -> FakeBrowser {
	let ws_listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
	let ws_port = ws_listener.local_addr().unwrap().port();
	let http_listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
	let http_port = http_listener.local_addr().unwrap().port();

	let ws_url = format!("ws://127.0.0.1:{ws_port}/devtools/browser/fake");
	let app = axum::Router::new().route(
		"/json/version",
		get(move || {
			let ws_url = ws_url.clone();
			async move {
				Json(json!({
					"webSocketDebuggerUrl": ws_url,
					"Browser": "FakeChrome/1.0",
					"Protocol-Version": "1.3",
				}))
			}
		}),
	);
	tokio::spawn(async move {
		axum::serve(http_listener, app).await.unwrap();
	});

	let commands: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
	let late_queries = Arc::new(AtomicUsize::new(0));
	let seen = Arc::clone(&commands);
	let late = Arc::clone(&late_queries);
	tokio::spawn(async move {
		let (socket, _) = ws_listener.accept().await.unwrap();
		let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

		while let Some(Ok(Message::Text(text))) = ws.next().await {
			let command: Value = serde_json::from_str(&text).unwrap();
			let id = command["id"].as_u64().unwrap();
			let method = command["method"].as_str().unwrap().to_string();
			let params = command["params"].clone();
			seen.lock().push((method.clone(), params.clone()));

			let result = respond(&method, &params, &late);
			let response = json!({"id": id, "result": result});
			ws.send(Message::Text(response.to_string())).await.unwrap();
		}
	});

	FakeBrowser {
		http_port,
		commands,
		late_queries,
	}
}

fn respond(method: &str, params: &Value, late: &AtomicUsize) -> Value {
	match method {
		"DOM.getDocument" => json!({"root": {"nodeId": 1}}),
		"DOM.querySelector" => {
			let node_id = match params["selector"].as_str().unwrap_or_default() {
				"#button" => 7,
				"#late" => {
					if late.fetch_add(1, Ordering::SeqCst) >= 2 {
						9
					} else {
						0
					}
				}
				_ => 0,
			};
			json!({"nodeId": node_id})
		}
		"DOM.getBoxModel" => json!({"model": {"content": [10.0, 20.0, 30.0, 20.0, 30.0, 40.0, 10.0, 40.0]}}),
		"DOM.getOuterHTML" => json!({"outerHTML": "<html><body><button id=\"button\"></button></body></html>"}),
		"Runtime.evaluate" => {
			let value = match params["expression"].as_str().unwrap_or_default() {
				"document.title" => json!("Fake Page"),
				"window.location.href" => json!(FAKE_PAGE_URL),
				_ => json!(2),
			};
			json!({"result": {"type": "string", "value": value}})
		}
		"Page.captureScreenshot" => json!({"data": BASE64.encode(FAKE_SCREENSHOT)}),
		_ => json!({}),
	}
}

async fn attached_session() -> (FakeBrowser, SessionClient) {
	let fake = spawn_fake_browser().await;
	let client = SessionClient::attach("session-test-0001", fake.container()).await.unwrap();
	(fake, client)
}

#[tokio::test]
async fn attach_enables_the_protocol_domains() {
	let (fake, client) = attached_session().await;
	assert_eq!(client.session_id(), "session-test-0001");

	let methods: Vec<String> = fake.commands.lock().iter().map(|(m, _)| m.clone()).collect();
	for domain in ["Page.enable", "Runtime.enable", "DOM.enable", "Network.enable"] {
		assert!(methods.contains(&domain.to_string()), "missing {domain}");
	}
}

#[tokio::test]
async fn navigate_issues_a_page_navigation() {
	let (fake, client) = attached_session().await;
	client.navigate("https://example.com/login").await.unwrap();

	let navigations = fake.received("Page.navigate");
	assert_eq!(navigations.len(), 1);
	assert_eq!(navigations[0]["url"], "https://example.com/login");
}

#[tokio::test]
async fn click_presses_and_releases_at_the_element_center() {
	let (fake, client) = attached_session().await;
	client.click("#button").await.unwrap();

	let clicks = fake.received("Input.dispatchMouseEvent");
	assert_eq!(clicks.len(), 2);
	assert_eq!(clicks[0]["type"], "mousePressed");
	assert_eq!(clicks[1]["type"], "mouseReleased");
	for click in &clicks {
		// Center of the content quad [10,20 30,20 30,40 10,40].
		assert_eq!(click["x"], 20.0);
		assert_eq!(click["y"], 30.0);
		assert_eq!(click["button"], "left");
		assert_eq!(click["clickCount"], 1);
	}
}

#[tokio::test]
async fn click_on_missing_selector_fails_cleanly() {
	let (fake, client) = attached_session().await;
	let err = client.click("#nope").await.unwrap_err();
	assert!(matches!(err, GridError::ElementNotFound { .. }));
	assert!(fake.received("Input.dispatchMouseEvent").is_empty());
}

#[tokio::test]
async fn type_text_clicks_then_sends_one_key_event_per_character() {
	let (fake, client) = attached_session().await;
	client.type_text("#button", "hi!").await.unwrap();

	assert_eq!(fake.received("Input.dispatchMouseEvent").len(), 2);
	let keys = fake.received("Input.dispatchKeyEvent");
	let typed: Vec<&str> = keys.iter().map(|p| p["text"].as_str().unwrap()).collect();
	assert_eq!(typed, vec!["h", "i", "!"]);
	assert!(keys.iter().all(|p| p["type"] == "char"));
}

#[tokio::test]
async fn evaluate_returns_the_value_by_value() {
	let (_fake, client) = attached_session().await;
	assert_eq!(client.evaluate("1 + 1").await.unwrap(), json!(2));
	assert_eq!(client.get_title().await.unwrap(), "Fake Page");
	assert_eq!(client.get_url().await.unwrap(), FAKE_PAGE_URL);
}

#[tokio::test]
async fn screenshot_decodes_the_base64_payload() {
	let (_fake, client) = attached_session().await;
	assert_eq!(client.screenshot().await.unwrap(), FAKE_SCREENSHOT);
}

#[tokio::test]
async fn get_html_returns_the_document_markup() {
	let (_fake, client) = attached_session().await;
	let html = client.get_html().await.unwrap();
	assert!(html.starts_with("<html>"));
}

#[tokio::test]
async fn wait_for_selector_polls_until_the_element_appears() {
	let (fake, client) = attached_session().await;
	client.wait_for_selector("#late", Duration::from_secs(2)).await.unwrap();
	assert!(fake.late_queries.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn wait_for_selector_times_out_on_a_missing_element() {
	let (_fake, client) = attached_session().await;
	let err = client.wait_for_selector("#never", Duration::from_millis(250)).await.unwrap_err();
	match err {
		GridError::Timeout { ms, condition } => {
			assert_eq!(ms, 250);
			assert!(condition.contains("#never"));
		}
		other => panic!("expected timeout, got {other:?}"),
	}
}

#[tokio::test]
async fn commands_refresh_the_idle_clock() {
	let (_fake, client) = attached_session().await;
	tokio::time::sleep(Duration::from_millis(60)).await;
	assert!(client.idle_for() >= Duration::from_millis(50));

	client.navigate("https://example.com").await.unwrap();
	assert!(client.idle_for() < Duration::from_millis(50));
}
