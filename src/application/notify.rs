//! Completion handling: store finished results and fire webhooks.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use url::Url;

use super::{queue::CompletionEvent, results::ResultStore};

const STATUS_SUCCESS: &str = "success";

/// Webhook payload. `result_location` is the absolute URL the caller can
/// GET the finished stylesheet from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationBody<'a> {
    generation_id: &'a str,
    status: &'a str,
    result_location: &'a str,
}

/// Posts completion webhooks. Delivery is fire-and-forget; a failed
/// delivery is logged and the result stays collectable in the store.
pub struct CompletionNotifier {
    client: reqwest::Client,
}

impl CompletionNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn notify(&self, notification_url: &Url, generation_id: &str, result_location: &str) {
        let body = NotificationBody {
            generation_id,
            status: STATUS_SUCCESS,
            result_location,
        };

        match self.client.post(notification_url.clone()).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    target = "application::notify",
                    generation_id,
                    notification_url = %notification_url,
                    "completion notification delivered"
                );
            }
            Ok(response) => {
                warn!(
                    target = "application::notify",
                    generation_id,
                    notification_url = %notification_url,
                    status = response.status().as_u16(),
                    "completion notification rejected"
                );
            }
            Err(err) => {
                error!(
                    target = "application::notify",
                    generation_id,
                    notification_url = %notification_url,
                    error = %err,
                    "completion notification failed"
                );
            }
        }
    }
}

/// Consume completion events: store each result, then notify the requester
/// if they asked for a webhook. Runs until the queue worker drops its
/// sender.
pub async fn listen(
    mut events: UnboundedReceiver<CompletionEvent>,
    results: Arc<ResultStore>,
    notifier: CompletionNotifier,
) {
    while let Some(event) = events.recv().await {
        let generation_id = event.job.id.to_string();
        results.insert(event.job.id, event.critical_css);

        if let Some(notification_url) = &event.job.request.notification_url {
            let result_location = format!("{}{generation_id}", event.job.request.result_endpoint);
            notifier
                .notify(notification_url, &generation_id, &result_location)
                .await;
        }
    }
}
