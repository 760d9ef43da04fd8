//! Chromium engine driven over the `DevTools` protocol

use super::engine::{BrowserEngine, BrowserError, BrowserHandle, PageHandle};
use super::ingest::EventSink;
use crate::capture::event::{ConsoleEvent, RequestEvent, ResponseEvent};
use crate::capture::{BodySource, CaptureError, PageEvent, PendingBody};
use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, GetRequestPostDataParams,
    GetResponseBodyParams, Request, RequestId, Response,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    EventConsoleApiCalled, ObjectPreviewSubtype, RemoteObject, StackTrace,
};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Upper bound on the text kept per console argument.
const MAX_ARG_BYTES: usize = 10_000;

const VIEWPORT_WIDTH: u32 = 1280;
const VIEWPORT_HEIGHT: u32 = 720;

/// Launches Chromium, preferring an installed browser.
///
/// Without an explicit executable, the system Chrome is tried first and a
/// compatible Chromium is downloaded into `cache_dir` if that fails.
pub struct ChromiumEngine {
    executable: Option<PathBuf>,
    cache_dir: PathBuf,
}

impl ChromiumEngine {
    pub fn new(executable: Option<PathBuf>, cache_dir: PathBuf) -> Self {
        Self {
            executable,
            cache_dir,
        }
    }

    async fn fetch_chromium(&self) -> Result<PathBuf, BrowserError> {
        tracing::info!(path = %self.cache_dir.display(), "Downloading Chromium (first run only)");

        std::fs::create_dir_all(&self.cache_dir).map_err(|e| {
            BrowserError::ChromeNotAvailable(format!(
                "cannot create cache dir {}: {e}",
                self.cache_dir.display()
            ))
        })?;

        let options = BrowserFetcherOptions::builder()
            .with_path(&self.cache_dir)
            .build()
            .map_err(|e| BrowserError::ChromeNotAvailable(format!("fetcher config error: {e}")))?;

        let info = BrowserFetcher::new(options)
            .fetch()
            .await
            .map_err(|e| BrowserError::ChromeNotAvailable(format!("download failed: {e:#}")))?;

        tracing::info!(path = %info.executable_path.display(), "Using downloaded Chromium");
        Ok(info.executable_path)
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn launch(&self, headless: bool) -> Result<Box<dyn BrowserHandle>, BrowserError> {
        if let Some(executable) = &self.executable {
            let browser = ChromiumBrowser::launch(headless, Some(executable)).await?;
            return Ok(Box::new(browser));
        }

        match ChromiumBrowser::launch(headless, None).await {
            Ok(browser) => return Ok(Box::new(browser)),
            Err(e) => tracing::info!(error = %e, "System Chrome not available, trying fetcher"),
        }

        let executable = self.fetch_chromium().await?;
        let browser = ChromiumBrowser::launch(headless, Some(&executable)).await?;
        Ok(Box::new(browser))
    }
}

struct ChromiumBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
    user_data_dir: PathBuf,
}

impl ChromiumBrowser {
    fn config(
        headless: bool,
        executable: Option<&Path>,
        user_data_dir: &Path,
    ) -> Result<BrowserConfig, BrowserError> {
        let builder = BrowserConfig::builder();
        let mut builder = if headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        builder = builder
            .no_sandbox()
            .arg("--disable-gpu")
            .user_data_dir(user_data_dir)
            .viewport(Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            });
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(BrowserError::LaunchFailed)
    }

    async fn launch(headless: bool, executable: Option<&Path>) -> Result<Self, BrowserError> {
        let user_data_dir =
            std::env::temp_dir().join(format!("browser-monitor-{}", std::process::id()));
        // A stale profile from a crashed run holds Chrome's SingletonLock
        let _ = std::fs::remove_dir_all(&user_data_dir);

        let config = Self::config(headless, executable, &user_data_dir)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "CDP handler error");
                }
            }
        });

        tracing::info!(headless, "Browser launched");
        Ok(Self {
            browser,
            handler_task,
            user_data_dir,
        })
    }
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_page(&self, sink: EventSink) -> Result<Arc<dyn PageHandle>, BrowserError> {
        let page = self.browser.new_page("about:blank").await?;

        let console = page.event_listener::<EventConsoleApiCalled>().await?;
        let requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let responses = page.event_listener::<EventResponseReceived>().await?;

        let forwarders = vec![
            tokio::spawn(forward_console(console, sink.clone())),
            tokio::spawn(forward_network(requests, responses, page.clone(), sink)),
        ];

        Ok(Arc::new(ChromiumPage {
            page,
            forwarders: Mutex::new(forwarders),
        }))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.browser.close().await?;
        self.browser
            .wait()
            .await
            .map_err(|e| BrowserError::OperationFailed(format!("waiting for browser exit: {e}")))?;
        Ok(())
    }

    async fn shutdown(self: Box<Self>) -> Result<(), BrowserError> {
        self.handler_task.abort();
        tokio::fs::remove_dir_all(&self.user_data_dir)
            .await
            .or_else(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Ok(()),
                _ => Err(e),
            })
            .map_err(|e| {
                BrowserError::OperationFailed(format!(
                    "removing {}: {e}",
                    self.user_data_dir.display()
                ))
            })
    }
}

struct ChromiumPage {
    page: Page,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl ChromiumPage {
    fn stop_forwarders(&self) {
        let forwarders = std::mem::take(
            &mut *self
                .forwarders
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for task in forwarders {
            task.abort();
        }
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.stop_forwarders();
        self.page.clone().close().await?;
        Ok(())
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.stop_forwarders();
    }
}

/// Reads a response body on demand through `Network.getResponseBody`.
struct ChromiumBody {
    page: Page,
    request_id: RequestId,
}

#[async_trait]
impl BodySource for ChromiumBody {
    async fn text(&self) -> Result<String, CaptureError> {
        let reply = self
            .page
            .execute(GetResponseBodyParams::new(self.request_id.clone()))
            .await
            .map_err(|e| CaptureError::BodyFetch(e.to_string()))?;

        if !reply.result.base64_encoded {
            return Ok(reply.result.body.clone());
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&reply.result.body)
            .map_err(|e| CaptureError::BodyFetch(format!("invalid base64 body: {e}")))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

async fn forward_console(mut events: EventStream<EventConsoleApiCalled>, sink: EventSink) {
    while let Some(event) = events.next().await {
        sink.emit(PageEvent::Console(console_event(&event)));
    }
}

/// One side of a page's network traffic.
enum NetworkEvent {
    Request(Arc<EventRequestWillBeSent>),
    Response(Arc<EventResponseReceived>),
}

/// Next network event, requests first.
///
/// The browser reports a request before its response, so draining every
/// ready request first keeps a response from overtaking the request it
/// answers.
async fn next_network_event<Q, P>(requests: &mut Q, responses: &mut P) -> Option<NetworkEvent>
where
    Q: Stream<Item = Arc<EventRequestWillBeSent>> + Unpin,
    P: Stream<Item = Arc<EventResponseReceived>> + Unpin,
{
    tokio::select! {
        biased;
        Some(request) = requests.next() => Some(NetworkEvent::Request(request)),
        Some(response) = responses.next() => Some(NetworkEvent::Response(response)),
        else => None,
    }
}

async fn forward_network(
    mut requests: EventStream<EventRequestWillBeSent>,
    mut responses: EventStream<EventResponseReceived>,
    page: Page,
    sink: EventSink,
) {
    while let Some(event) = next_network_event(&mut requests, &mut responses).await {
        match event {
            NetworkEvent::Request(event) => forward_request(&event, &page, &sink).await,
            NetworkEvent::Response(event) => {
                let body = PendingBody::new(ChromiumBody {
                    page: page.clone(),
                    request_id: event.request_id.clone(),
                });
                sink.emit(PageEvent::Response(response_event(
                    &event.response,
                    Some(event.request_id.inner().clone()),
                    Some(body),
                )));
            }
        }
    }
}

async fn forward_request(event: &EventRequestWillBeSent, page: &Page, sink: &EventSink) {
    let timestamp = sink.now();

    // The previous hop of a redirect shares this request id
    if let Some(redirect) = &event.redirect_response {
        sink.emit_at(
            timestamp,
            PageEvent::Response(response_event(
                redirect,
                Some(event.request_id.inner().clone()),
                None,
            )),
        );
    }

    let mut post_data = inline_post_data(&event.request);
    if post_data.is_none() && event.request.has_post_data.unwrap_or(false) {
        // Chrome leaves large bodies out of the event
        match page
            .execute(GetRequestPostDataParams::new(event.request_id.clone()))
            .await
        {
            Ok(reply) => post_data = Some(reply.result.post_data.clone()),
            Err(e) => tracing::debug!(url = %event.request.url, error = %e, "Post data unavailable"),
        }
    }

    sink.emit_at(timestamp, PageEvent::Request(request_event(event, post_data)));
}

fn request_event(event: &EventRequestWillBeSent, post_data: Option<String>) -> RequestEvent {
    RequestEvent {
        request_id: event.request_id.inner().clone(),
        url: event.request.url.clone(),
        method: event.request.method.clone(),
        headers: event.request.headers.inner().clone(),
        resource_type: event
            .r#type
            .as_ref()
            .map_or_else(|| "other".to_string(), |t| wire_name(t).to_ascii_lowercase()),
        post_data,
    }
}

/// Post data carried in the event itself, decoded from its base64 entries.
fn inline_post_data(request: &Request) -> Option<String> {
    let entries = request.post_data_entries.as_ref()?;
    let mut bytes = Vec::new();
    for entry in entries {
        let Some(chunk) = &entry.bytes else { continue };
        let encoded: &str = chunk.as_ref();
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(decoded) => bytes.extend(decoded),
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "Undecodable post data entry");
                return None;
            }
        }
    }
    if bytes.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn response_event(response: &Response, request_id: Option<String>, body: Option<PendingBody>) -> ResponseEvent {
    ResponseEvent {
        request_id,
        url: response.url.clone(),
        status: response.status,
        status_text: response.status_text.clone(),
        headers: response.headers.inner().clone(),
        body,
    }
}

fn console_event(event: &EventConsoleApiCalled) -> ConsoleEvent {
    let args: Vec<String> = event.args.iter().map(console_arg_text).collect();
    let top_frame = event
        .stack_trace
        .as_ref()
        .and_then(|trace| trace.call_frames.first());

    ConsoleEvent {
        kind: wire_name(&event.r#type),
        text: args.join(" "),
        location: top_frame.map_or(Value::Null, |frame| {
            json!({
                "url": frame.url,
                "lineNumber": frame.line_number,
                "columnNumber": frame.column_number,
            })
        }),
        stack_trace: event.stack_trace.as_ref().map(stack_frames),
        args,
        page: None,
    }
}

fn stack_frames(trace: &StackTrace) -> Value {
    trace
        .call_frames
        .iter()
        .map(|frame| {
            json!({
                "functionName": frame.function_name,
                "url": frame.url,
                "lineNumber": frame.line_number,
                "columnNumber": frame.column_number,
            })
        })
        .collect()
}

/// Protocol spelling of an enum value, e.g. `warning` or `XHR`.
fn wire_name<T: Serialize + std::fmt::Debug>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(name)) => name,
        _ => format!("{value:?}").to_lowercase(),
    }
}

/// Render one console argument the way `DevTools` would show it.
///
/// Primitives come through `value`; objects and arrays only carry a
/// `preview`; everything else falls back to the description or the
/// unserializable literal (`undefined`, `NaN`).
fn console_arg_text(arg: &RemoteObject) -> String {
    let text = if let Some(value) = &arg.value {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    } else if let Some(preview) = &arg.preview {
        let is_array = matches!(preview.subtype, Some(ObjectPreviewSubtype::Array));
        let mut parts: Vec<String> = preview
            .properties
            .iter()
            .map(|property| {
                let value = property.value.as_deref().unwrap_or("…");
                if is_array {
                    value.to_string()
                } else {
                    format!("{}: {value}", property.name)
                }
            })
            .collect();
        if preview.overflow {
            parts.push("…".to_string());
        }
        let (open, close) = if is_array { ('[', ']') } else { ('{', '}') };
        format!("{open}{}{close}", parts.join(", "))
    } else if let Some(description) = &arg.description {
        description.clone()
    } else if let Some(literal) = &arg.unserializable_value {
        literal.inner().clone()
    } else {
        "[unknown]".to_string()
    };
    truncate_at_char_boundary(text, MAX_ARG_BYTES)
}

/// Cut `text` to at most `max_bytes` without splitting a character,
/// marking the cut with `…`.
fn truncate_at_char_boundary(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push('…');
    text
}
