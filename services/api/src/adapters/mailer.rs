//! services/api/src/adapters/mailer.rs
//!
//! This module contains the adapter that delivers feedback emails through an
//! HTTP mail relay. It implements the `FeedbackNotifier` port from the `core` crate.

use async_trait::async_trait;
use readers_core::domain::FeedbackNotice;
use readers_core::ports::{FeedbackNotifier, PortError, PortResult};
use serde::Serialize;

use crate::config::MailConfig;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that posts rendered feedback emails to a mail relay.
#[derive(Clone)]
pub struct HttpMailNotifier {
    client: reqwest::Client,
    config: MailConfig,
}

/// The JSON payload accepted by the relay.
#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: String,
    html: String,
}

impl HttpMailNotifier {
    /// Creates a new `HttpMailNotifier`; every request is bounded by the
    /// configured timeout.
    pub fn new(config: MailConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

/// Escapes the characters that matter inside HTML text.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders the HTML body of a feedback email.
pub fn render_feedback_html(notice: &FeedbackNotice) -> String {
    let feedback = &notice.feedback;
    let rows = [
        ("Workbook", notice.workbook_number.to_string()),
        (
            "Version",
            format!("{}.{}", feedback.major_version, feedback.minor_version),
        ),
        ("Localization", feedback.localization.clone()),
        ("Chapter", feedback.chapter_number.to_string()),
        ("Page", feedback.page_number.to_string()),
        ("User email", feedback.user_email.clone()),
        (
            "Date submitted",
            feedback.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
    ];

    let mut html = String::from("<html><body><h2>User Feedback</h2><table>");
    for (label, value) in rows {
        html.push_str(&format!(
            "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
            label,
            escape_html(&value)
        ));
    }
    html.push_str("</table><h3>Description</h3><p>");
    html.push_str(&escape_html(&feedback.description));
    html.push_str("</p></body></html>");
    html
}

//=========================================================================================
// `FeedbackNotifier` Trait Implementation
//=========================================================================================

#[async_trait]
impl FeedbackNotifier for HttpMailNotifier {
    async fn notify(&self, notice: &FeedbackNotice) -> PortResult<()> {
        let email = OutgoingEmail {
            from: &self.config.from_email,
            to: [&self.config.feedback_email],
            subject: notice.subject(),
            html: render_feedback_html(notice),
        };

        let mut request = self.client.post(&self.config.relay_url).json(&email);
        if let Some(token) = &self.config.relay_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Mail relay request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "Mail relay answered with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use readers_core::domain::Feedback;

    #[test]
    fn renders_subject_and_escaped_body() {
        let notice = FeedbackNotice {
            feedback: Feedback {
                id: 1,
                workbook: 9,
                page_number: 12,
                chapter_number: 3,
                description: "Answer key says <b>42</b> & the text says 24".to_string(),
                user_email: "reader@example.org".to_string(),
                created_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap(),
                major_version: 1,
                minor_version: 2,
                localization: "en-US".to_string(),
                logs: None,
            },
            workbook_number: 4,
        };

        assert_eq!(notice.subject(), "User Feedback: Workbook 4 (v1.2 en-US)");

        let html = render_feedback_html(&notice);
        assert!(html.contains("&lt;b&gt;42&lt;/b&gt; &amp; the text"));
        assert!(html.contains("2025-03-14 09:26:53"));
        assert!(html.contains("<td>1.2</td>"));
    }
}
