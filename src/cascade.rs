//! `CascadeOrchestrator`: generalizes the inherited request-with-fallback
//! retry loop (which already round-robins upstream endpoints with backoff
//! for the non-streaming path) to streaming, with the one behavioral
//! change the spec requires — once any byte has been forwarded to the
//! client, the loop commits to that stream and never fails over.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::error::GatewayError;
use crate::keyvault::AdminKeyStore;
use crate::providers::{self, BuildRequestParams};
use crate::sse::{self, drain_sse_lines};

pub struct CascadeRequest {
    pub cascade: Vec<(String, String)>,
    pub system_prompt: String,
    pub user_message: String,
    pub image_base64: Option<String>,
    pub max_tokens: u32,
    pub smart_mode: bool,
}

/// Runs the cascade in a background task and returns a byte stream the
/// caller wraps directly in an SSE `Response`. Every frame is a complete
/// `data: ...\n\n` event; the stream ends after exactly one terminator or
/// exactly one error frame.
pub fn run(
    req: CascadeRequest,
    key_store: &dyn AdminKeyStore,
    settings: &Settings,
    on_done: impl FnOnce() + Send + 'static,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let (tx, rx) = mpsc::channel::<String>(32);

    let providers_cfg = settings.providers.clone();
    let connect_timeout = Duration::from_secs(settings.upstream_connect_timeout_secs);
    let idle_timeout = Duration::from_secs(settings.upstream_idle_read_timeout_secs);

    let active_keys: Vec<(String, String)> = req
        .cascade
        .iter()
        .filter_map(|(provider, _)| {
            key_store
                .active_key(provider)
                .ok()
                .flatten()
                .map(|k| (provider.clone(), k))
        })
        .collect();

    tokio::spawn(async move {
        drive_cascade(tx, req, providers_cfg, active_keys, connect_timeout, idle_timeout).await;
        on_done();
    });

    tokio_stream_from_receiver(rx)
}

fn tokio_stream_from_receiver(rx: mpsc::Receiver<String>) -> impl Stream<Item = Result<Bytes, Infallible>> {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok(Bytes::from(frame)), rx))
    })
}

async fn drive_cascade(
    tx: mpsc::Sender<String>,
    req: CascadeRequest,
    providers_cfg: std::collections::HashMap<String, crate::config::ProviderConfig>,
    active_keys: Vec<(String, String)>,
    connect_timeout: Duration,
    idle_timeout: Duration,
) {
    let client = match reqwest::Client::builder().connect_timeout(connect_timeout).build() {
        Ok(c) => c,
        Err(e) => {
            let _ = tx
                .send(GatewayError::ServerError(format!("http client build failed: {e}")).to_sse_frame())
                .await;
            return;
        }
    };

    let mut details: Vec<String> = Vec::new();
    let mut first_byte_sent = false;

    for (provider, model) in &req.cascade {
        let Some(api_key) = active_keys.iter().find(|(p, _)| p == provider).map(|(_, k)| k.clone()) else {
            details.push(format!("{provider}: not configured"));
            continue;
        };
        let Some(provider_cfg) = providers_cfg.get(provider) else {
            details.push(format!("{provider}: not configured"));
            continue;
        };
        let adapter = match providers::for_provider(provider) {
            Ok(a) => a,
            Err(_) => {
                details.push(format!("{provider}: unsupported provider"));
                continue;
            }
        };

        let params = BuildRequestParams {
            system_prompt: &req.system_prompt,
            user_message: &req.user_message,
            image_base64: req.image_base64.as_deref(),
            max_tokens: req.max_tokens,
            smart_mode: req.smart_mode,
        };
        let spec = adapter.build_request(&provider_cfg.base_url, model, &api_key, &params);

        let mut builder = client.post(&spec.url);
        for (name, value) in &spec.headers {
            builder = builder.header(name, value);
        }

        let response = match builder.json(&spec.body).send().await {
            Ok(r) => r,
            Err(e) => {
                details.push(format!("{provider}/{model}: request failed: {e}"));
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let preview: String = response.text().await.unwrap_or_default().chars().take(200).collect();
            details.push(format!("{provider}/{model}: {status} {preview}"));
            continue;
        }

        let mut byte_stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;
        let mut provider_failed_mid_stream = false;

        loop {
            let next = tokio::time::timeout(idle_timeout, byte_stream.next()).await;
            let chunk = match next {
                Ok(Some(Ok(bytes))) => bytes,
                Ok(Some(Err(e))) => {
                    if first_byte_sent {
                        let _ = tx.send(GatewayError::ProviderError(e.to_string()).to_sse_frame()).await;
                        provider_failed_mid_stream = true;
                    } else {
                        details.push(format!("{provider}/{model}: stream error: {e}"));
                    }
                    break;
                }
                Ok(None) => {
                    if !first_byte_sent {
                        details.push(format!("{provider}/{model}: upstream closed without a response"));
                    }
                    break;
                }
                Err(_) => {
                    if first_byte_sent {
                        let _ = tx
                            .send(GatewayError::ProviderError("upstream idle read timeout".into()).to_sse_frame())
                            .await;
                        provider_failed_mid_stream = true;
                    } else {
                        details.push(format!("{provider}/{model}: idle read timeout"));
                    }
                    break;
                }
            };

            for line in drain_sse_lines(&mut buffer, &chunk) {
                match adapter.parse_stream_event(&line) {
                    providers::StreamEvent::Delta(text) => {
                        first_byte_sent = true;
                        if tx.send(sse::content_frame(&text)).await.is_err() {
                            return; // client disconnected
                        }
                    }
                    providers::StreamEvent::Done => {
                        done = true;
                    }
                    providers::StreamEvent::Ignore => {}
                }
            }
            if done {
                break;
            }
        }

        if provider_failed_mid_stream {
            return; // first-byte commit: do not fail over once we've forwarded a byte
        }
        if first_byte_sent {
            let _ = tx.send(sse::DONE_FRAME.to_string()).await;
            return;
        }
        // pre-first-byte failure on this provider: fall through to the next cascade entry
    }

    if !first_byte_sent {
        let message = "all configured providers failed before producing a response";
        let frame = format!(
            "data: {}\n\n",
            serde_json::json!({ "error": "all_providers_failed", "message": message, "details": details })
        );
        let _ = tx.send(frame).await;
    }
}
