//! Image Placeholder Rewriting
//!
//! Chat messages reference images the client has not uploaded yet with
//! `(image://<name>.png)`. Saving a chat replaces every placeholder with the
//! public download URL of a freshly minted storage key and hands back one
//! pre-signed upload URL per distinct name, so the client can push the bytes
//! after the save returns.
//!
//! Placeholders are resolved strictly in order: messages in sequence order and,
//! within a message, left to right. A name seen earlier in the same save reuses
//! the earlier record instead of minting a new key.

pub mod urls;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::ChatMessage;
use crate::utils::random_alphanumeric;

pub use urls::{collect_image_urls, image_urls_in};

const PLACEHOLDER_OPEN: &str = "(image://";
const IMAGE_EXTENSION: &str = ".png";
const KEY_SUFFIX_LEN: usize = 10;

/// Issues single-write credentials for a storage key.
#[async_trait]
pub trait UploadSigner: Send + Sync {
    async fn presign_upload(&self, key: &str) -> anyhow::Result<String>;
}

/// One resolved placeholder: where the image will live and how to put it there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSubstitution {
    pub name: String,
    pub url: String,
    pub upload_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("Unsupported image type for {name}: only .png images are supported")]
    UnsupportedImage { name: String },

    #[error("Failed to sign upload url for {key}: {source}")]
    Signing {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Substitutions already created during one save, keyed by placeholder name.
/// Iteration order is creation order.
#[derive(Debug, Default)]
pub struct SubstitutionSet {
    by_name: HashMap<String, usize>,
    records: Vec<ImageSubstitution>,
}

impl SubstitutionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ImageSubstitution> {
        self.by_name.get(name).map(|&index| &self.records[index])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_vec(self) -> Vec<ImageSubstitution> {
        self.records
    }

    fn insert(&mut self, record: ImageSubstitution) {
        self.by_name.insert(record.name.clone(), self.records.len());
        self.records.push(record);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenMessages {
    pub messages: Vec<ChatMessage>,
    pub substitutions: Vec<ImageSubstitution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenContent {
    pub text: String,
    /// Records minted by this call only; hits on earlier records are not repeated.
    pub created: Vec<ImageSubstitution>,
}

#[derive(Clone)]
pub struct ImageRewriter {
    signer: Arc<dyn UploadSigner>,
    public_base_url: String,
    key_prefix: String,
}

impl ImageRewriter {
    pub fn new(
        signer: Arc<dyn UploadSigner>,
        public_base_url: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            signer,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            key_prefix: key_prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Rewrite every message's content, sharing one dedup set across the whole
    /// sequence. The input is left untouched; any error discards all output.
    pub async fn rewrite_all(
        &self,
        messages: &[ChatMessage],
    ) -> Result<RewrittenMessages, RewriteError> {
        let mut seen = SubstitutionSet::new();
        let mut rewritten = Vec::with_capacity(messages.len());

        for message in messages {
            let message = match message.text_content() {
                Some(content) => {
                    let result = self.rewrite_content(content, &mut seen).await?;
                    message.with_text_content(result.text)
                }
                None => message.clone(),
            };
            rewritten.push(message);
        }

        Ok(RewrittenMessages {
            messages: rewritten,
            substitutions: seen.into_vec(),
        })
    }

    /// Rewrite the placeholders of a single message body.
    ///
    /// `seen` must hold every substitution created earlier in the same save;
    /// records minted here are added to it before the scan moves on.
    pub async fn rewrite_content(
        &self,
        content: &str,
        seen: &mut SubstitutionSet,
    ) -> Result<RewrittenContent, RewriteError> {
        let mut text = String::with_capacity(content.len());
        let mut created = Vec::new();
        let mut rest = content;

        while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
            let after_open = &rest[start + PLACEHOLDER_OPEN.len()..];
            // Unterminated placeholder: leave the tail as it is.
            let Some(end) = after_open.find(')') else {
                break;
            };

            let name = &after_open[..end];
            if !name.ends_with(IMAGE_EXTENSION) {
                return Err(RewriteError::UnsupportedImage {
                    name: name.to_string(),
                });
            }

            text.push_str(&rest[..start]);
            let url = match seen.get(name) {
                Some(existing) => existing.url.clone(),
                None => {
                    let record = self.mint(name).await?;
                    let url = record.url.clone();
                    seen.insert(record.clone());
                    created.push(record);
                    url
                }
            };
            text.push('(');
            text.push_str(&url);
            text.push(')');

            rest = &after_open[end + 1..];
        }
        text.push_str(rest);

        Ok(RewrittenContent { text, created })
    }

    async fn mint(&self, name: &str) -> Result<ImageSubstitution, RewriteError> {
        let key = self.new_object_key();
        let upload_url = self
            .signer
            .presign_upload(&key)
            .await
            .map_err(|source| RewriteError::Signing {
                key: key.clone(),
                source,
            })?;

        debug!(name, key = %key, "Issued image upload url");

        Ok(ImageSubstitution {
            name: name.to_string(),
            url: format!("{}/{}", self.public_base_url, key),
            upload_url,
        })
    }

    fn new_object_key(&self) -> String {
        let date = Utc::now().format("%Y-%m-%d");
        let suffix = random_alphanumeric(KEY_SUFFIX_LEN);
        if self.key_prefix.is_empty() {
            format!("images/{}/{}{}", date, suffix, IMAGE_EXTENSION)
        } else {
            format!("{}/images/{}/{}{}", self.key_prefix, date, suffix, IMAGE_EXTENSION)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Signer that hands out numbered URLs and counts how often it was asked.
    #[derive(Default)]
    pub(crate) struct CountingSigner {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl UploadSigner for CountingSigner {
        async fn presign_upload(&self, key: &str) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://upload.test/{}?sig={}", key, n))
        }
    }

    struct FailingSigner;

    #[async_trait]
    impl UploadSigner for FailingSigner {
        async fn presign_upload(&self, _key: &str) -> anyhow::Result<String> {
            anyhow::bail!("bucket unavailable")
        }
    }

    fn rewriter(signer: Arc<dyn UploadSigner>) -> ImageRewriter {
        ImageRewriter::new(signer, "https://cdn.test/", "chats")
    }

    fn message(content: &str) -> ChatMessage {
        ChatMessage::text("user", content)
    }

    #[tokio::test]
    async fn test_content_without_placeholders_is_unchanged() {
        let signer = Arc::new(CountingSigner::default());
        let rewriter = rewriter(signer.clone());
        let mut seen = SubstitutionSet::new();

        let content = "plain text with (parens) and image:// but no placeholder";
        let result = rewriter.rewrite_content(content, &mut seen).await.unwrap();

        assert_eq!(result.text, content);
        assert!(result.created.is_empty());
        assert!(seen.is_empty());
        assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeated_name_in_one_message_is_minted_once() {
        let signer = Arc::new(CountingSigner::default());
        let rewriter = rewriter(signer.clone());
        let mut seen = SubstitutionSet::new();

        let result = rewriter
            .rewrite_content("a (image://fig.png) b (image://fig.png) c", &mut seen)
            .await
            .unwrap();

        assert_eq!(result.created.len(), 1);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
        let url = &result.created[0].url;
        assert_eq!(result.text, format!("a ({url}) b ({url}) c"));
    }

    #[tokio::test]
    async fn test_dedup_spans_messages() {
        let signer = Arc::new(CountingSigner::default());
        let rewriter = rewriter(signer.clone());

        let messages = vec![
            message("first (image://fig.png)"),
            message("second (image://fig.png)"),
        ];
        let result = rewriter.rewrite_all(&messages).await.unwrap();

        assert_eq!(result.substitutions.len(), 1);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
        let url = &result.substitutions[0].url;
        assert_eq!(result.messages[0].text_content(), Some(format!("first ({url})").as_str()));
        assert_eq!(result.messages[1].text_content(), Some(format!("second ({url})").as_str()));
    }

    #[tokio::test]
    async fn test_earlier_records_are_not_reported_as_created() {
        let signer = Arc::new(CountingSigner::default());
        let rewriter = rewriter(signer.clone());
        let mut seen = SubstitutionSet::new();

        rewriter
            .rewrite_content("(image://a.png)", &mut seen)
            .await
            .unwrap();
        let second = rewriter
            .rewrite_content("(image://a.png) (image://b.png)", &mut seen)
            .await
            .unwrap();

        assert_eq!(second.created.len(), 1);
        assert_eq!(second.created[0].name, "b.png");
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_non_png_placeholder_fails_whole_rewrite() {
        let signer = Arc::new(CountingSigner::default());
        let rewriter = rewriter(signer.clone());

        let messages = vec![message("ok (image://a.png)"), message("bad (image://a.jpg)")];
        let err = rewriter.rewrite_all(&messages).await.unwrap_err();

        match err {
            RewriteError::UnsupportedImage { name } => assert_eq!(name, "a.jpg"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_placeholder_without_extension_is_rejected() {
        let rewriter = rewriter(Arc::new(CountingSigner::default()));
        let mut seen = SubstitutionSet::new();

        let err = rewriter
            .rewrite_content("see (image://figure)", &mut seen)
            .await
            .unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedImage { .. }));
    }

    #[tokio::test]
    async fn test_unterminated_placeholder_is_preserved() {
        let signer = Arc::new(CountingSigner::default());
        let rewriter = rewriter(signer.clone());
        let mut seen = SubstitutionSet::new();

        let content = "done (image://a.png) then (image://unterminated";
        let result = rewriter.rewrite_content(content, &mut seen).await.unwrap();

        let url = &result.created[0].url;
        assert_eq!(result.text, format!("done ({url}) then (image://unterminated"));
        assert_eq!(result.created.len(), 1);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signing_failure_propagates() {
        let rewriter = rewriter(Arc::new(FailingSigner));

        let err = rewriter
            .rewrite_all(&[message("(image://a.png)")])
            .await
            .unwrap_err();

        match err {
            RewriteError::Signing { key, source } => {
                assert!(key.starts_with("chats/images/"));
                assert!(source.to_string().contains("bucket unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_minted_url_layout() {
        let rewriter = rewriter(Arc::new(CountingSigner::default()));
        let mut seen = SubstitutionSet::new();

        let result = rewriter
            .rewrite_content("(image://plot.png)", &mut seen)
            .await
            .unwrap();
        let record = &result.created[0];

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let prefix = format!("https://cdn.test/chats/images/{date}/");
        assert!(record.url.starts_with(&prefix), "{}", record.url);

        let file = record.url.trim_start_matches(&prefix);
        let stem = file.strip_suffix(".png").unwrap();
        assert_eq!(stem.len(), 10);
        assert!(stem.chars().all(|c| c.is_ascii_alphanumeric()));

        assert!(record.upload_url.contains(record.url.trim_start_matches("https://cdn.test/")));
        assert_eq!(record.name, "plot.png");
    }

    #[tokio::test]
    async fn test_same_name_in_separate_saves_gets_distinct_urls() {
        let rewriter = rewriter(Arc::new(CountingSigner::default()));

        let first = rewriter.rewrite_all(&[message("(image://a.png)")]).await.unwrap();
        let second = rewriter.rewrite_all(&[message("(image://a.png)")]).await.unwrap();

        assert_ne!(first.substitutions[0].url, second.substitutions[0].url);
    }

    #[tokio::test]
    async fn test_other_message_fields_pass_through() {
        let rewriter = rewriter(Arc::new(CountingSigner::default()));

        let original: ChatMessage = serde_json::from_value(serde_json::json!({
            "role": "assistant",
            "model": "gpt-4o",
            "content": "(image://a.png)"
        }))
        .unwrap();
        let null_content: ChatMessage = serde_json::from_value(serde_json::json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{"id": "1"}]
        }))
        .unwrap();
        let parts: ChatMessage = serde_json::from_value(serde_json::json!({
            "role": "user",
            "content": [{"type": "text", "text": "(image://b.png)"}]
        }))
        .unwrap();
        let input = vec![original.clone(), null_content.clone(), parts.clone()];

        let result = rewriter.rewrite_all(&input).await.unwrap();

        let rewritten = result.messages[0].fields();
        assert_eq!(rewritten["model"], "gpt-4o");
        assert_eq!(rewritten["role"], "assistant");
        assert_eq!(result.messages[1], null_content);
        // structured content is not scanned
        assert_eq!(result.messages[2], parts);
        assert_eq!(result.substitutions.len(), 1);
        // caller's sequence is untouched
        assert_eq!(input[0].text_content(), Some("(image://a.png)"));
    }

    #[tokio::test]
    async fn test_rewritten_output_feeds_url_collector() {
        let rewriter = rewriter(Arc::new(CountingSigner::default()));

        let messages = vec![
            message("see (image://a.png) and (image://a.png)"),
            message("also (image://b.png)"),
        ];
        let result = rewriter.rewrite_all(&messages).await.unwrap();

        let names: Vec<&str> = result.substitutions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.png"]);

        let urls = collect_image_urls(&result.messages);
        assert_eq!(
            urls,
            vec![
                result.substitutions[0].url.clone(),
                result.substitutions[1].url.clone(),
            ]
        );
    }
}
