//! Telegram notification for new customer requests.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::config::TelegramConfig;
use crate::models::CustomerRequest;

/// Almaty is UTC+5 all year.
const ALMATY_OFFSET_SECS: i32 = 5 * 3600;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to reach Telegram: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Telegram API error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    pub async fn send_request(&self, request: &CustomerRequest) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.send_message_url())
            .json(&json!({
                "chat_id": self.config.chat_id,
                "text": format_request_message(request),
                "parse_mode": "HTML",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api { status, body });
        }

        info!("Telegram message sent for request {}", request.id);
        Ok(())
    }

    /// Sends in the background. Failures are logged and otherwise ignored.
    pub fn spawn_send(&self, request: CustomerRequest) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.send_request(&request).await {
                error!("Failed to send Telegram message for request {}: {err}", request.id);
            }
        });
    }
}

pub fn format_request_message(request: &CustomerRequest) -> String {
    let comment = request
        .comment
        .as_deref()
        .map_or_else(|| "Не указан".to_string(), escape_html);

    format!(
        "🔥 Новая заявка с сайта SmartBuildAstana!\n\
         \n\
         👤 Имя: {}\n\
         📞 Телефон: {}\n\
         💬 Комментарий: {}\n\
         🕒 Время: {}\n\
         \n\
         #заявка #smartbuildastana",
        escape_html(&request.name),
        escape_html(&request.phone),
        comment,
        almaty_time(request.created_at)
    )
}

fn almaty_time(at: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(ALMATY_OFFSET_SECS) {
        Some(offset) => at
            .with_timezone(&offset)
            .format("%d.%m.%Y, %H:%M:%S")
            .to_string(),
        None => at.format("%d.%m.%Y, %H:%M:%S UTC").to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
