//! Escalation of failures to the operator chat.

use std::{error::Error as _, sync::Arc, time::Duration};

use {
    topicdesk_common::{
        html::{bold, chunk_chars, code, escape_html, truncate_chars},
        types::{ChatId, Destination, MessageId},
    },
    tracing::{error, warn},
};

use crate::{error::Error, platform::Platform, provision::ProvisionError};

const CAPTION_LIMIT: usize = 1024;
const MESSAGE_LIMIT: usize = 4096;
const CHUNK_PAUSE: Duration = Duration::from_millis(100);

/// Sends diagnostics to the operator.
///
/// A full report is a text document holding the error chain, captioned with
/// the error kind and message, followed by the triggering payload split into
/// code blocks.
pub struct AdminReporter {
    platform: Arc<dyn Platform>,
    operator: ChatId,
}

impl AdminReporter {
    pub fn new(platform: Arc<dyn Platform>, operator: ChatId) -> Self {
        Self { platform, operator }
    }

    /// Forward a provisioning failure. Its message is shown verbatim.
    pub async fn report_provision(&self, err: &ProvisionError) {
        let text = escape_html(&err.to_string());
        if let Err(e) = self
            .platform
            .send_text(Destination::chat(self.operator), &text, None)
            .await
        {
            error!(error = %e, provision_error = %err, "failed to notify operator");
        }
    }

    /// Report an unclassified failure together with the payload that caused
    /// it. `label` names the report file, e.g. the update id.
    pub async fn report_failure(&self, label: &str, err: &Error, payload: &str) {
        let kind = err.kind();
        let message = err.to_string();
        let caption = caption(kind, &message);

        let document = match self
            .platform
            .send_document(
                self.operator,
                &format!("error_{label}.txt"),
                error_chain(err).into_bytes(),
                &caption,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, failure = %message, "failed to deliver failure report");
                return;
            },
        };

        self.send_payload(document, payload).await;
    }

    async fn send_payload(&self, reply_to: MessageId, payload: &str) {
        let to = Destination::chat(self.operator);
        for chunk in chunk_chars(payload, MESSAGE_LIMIT - "<code></code>".len()) {
            if let Err(e) = self
                .platform
                .send_text(to, &code(chunk), Some(reply_to))
                .await
            {
                warn!(error = %e, "failed to send report payload chunk");
                return;
            }
            tokio::time::sleep(CHUNK_PAUSE).await;
        }
    }
}

fn caption(kind: &str, message: &str) -> String {
    let budget = CAPTION_LIMIT.saturating_sub(kind.chars().count() + 2);
    format!("{}:\n{}", bold(kind), code(truncate_chars(message, budget)))
}

fn error_chain(err: &Error) -> String {
    let mut out = format!("{}: {err}\n", err.kind());
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(&format!("caused by: {cause}\n"));
        source = cause.source();
    }
    out.push_str(&format!("\n{err:#?}\n"));
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{platform::PlatformError, testing::FakePlatform},
    };

    #[tokio::test]
    async fn provision_errors_use_fixed_text() {
        let platform = FakePlatform::shared();
        let reporter = AdminReporter::new(platform.clone(), ChatId(42));

        reporter
            .report_provision(&ProvisionError::InsufficientRights)
            .await;

        let texts = platform.texts();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].to, Destination::chat(ChatId(42)));
        assert_eq!(
            texts[0].text,
            "The bot doesn't have sufficient rights to create a forum topic."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_report_has_document_and_chunks() {
        let platform = FakePlatform::shared();
        let reporter = AdminReporter::new(platform.clone(), ChatId(42));
        let err = Error::from(PlatformError::Rejected("Bad Request: <oops>".into()));
        let payload = "x".repeat(5_000);

        reporter.report_failure("17", &err, &payload).await;

        let docs = platform.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_name, "error_17.txt");
        assert_eq!(
            docs[0].caption,
            "<b>PlatformError</b>:\n<code>rejected by platform: Bad Request: &lt;oops&gt;</code>"
        );
        let body = String::from_utf8(docs[0].contents.clone()).unwrap();
        assert!(body.starts_with("PlatformError: rejected by platform"));

        let texts = platform.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts.iter().all(|t| t.text.chars().count() <= MESSAGE_LIMIT));
        assert!(texts.iter().all(|t| t.reply_to.is_some()));
        let joined: String = texts
            .iter()
            .map(|t| t.text.trim_start_matches("<code>").trim_end_matches("</code>"))
            .collect();
        assert_eq!(joined, payload);
    }

    #[test]
    fn caption_is_bounded() {
        let long = "e".repeat(3_000);
        let text = caption("RelayError", &long);
        let body = text
            .trim_start_matches("<b>RelayError</b>:\n<code>")
            .trim_end_matches("</code>");
        assert_eq!(body.chars().count(), CAPTION_LIMIT - "RelayError".len() - 2);
    }
}
