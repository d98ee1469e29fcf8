use anyhow::Context;
use serde::Deserialize;

use crate::config::TranslateConfig;
use crate::settings::Locale;

/// Machine translation through the DeepL v2 API.
#[derive(Clone)]
pub struct Translator {
    http: reqwest::Client,
    config: TranslateConfig,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
struct Translation {
    text: String,
}

fn deepl_code(locale: Locale) -> &'static str {
    match locale {
        Locale::Ko => "KO",
        Locale::En => "EN-US",
        Locale::Ja => "JA",
        Locale::Zh => "ZH",
    }
}

impl Translator {
    pub fn new(http: reqwest::Client, config: TranslateConfig) -> Self {
        Self { http, config }
    }

    /// Translates `texts` in one request, preserving order.
    pub async fn translate(&self, texts: &[String], source: Locale, target: Locale) -> anyhow::Result<Vec<String>> {
        if texts.is_empty() || source == target {
            return Ok(texts.to_vec());
        }

        let url = format!("{}/v2/translate", self.config.api_url.trim_end_matches('/'));
        let source_code = match source {
            // source_lang takes no regional variant
            Locale::En => "EN",
            other => deepl_code(other),
        };
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.config.api_key))
            .json(&serde_json::json!({
                "text": texts,
                "source_lang": source_code,
                "target_lang": deepl_code(target),
            }))
            .send()
            .await
            .context("translation request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("translation API error: {} - {}", status, text);
        }

        let body: TranslateResponse = resp.json().await.context("invalid translation response")?;
        if body.translations.len() != texts.len() {
            anyhow::bail!(
                "translation API returned {} texts for {}",
                body.translations.len(),
                texts.len()
            );
        }
        Ok(body.translations.into_iter().map(|t| t.text).collect())
    }

    /// Like [`translate`](Self::translate) but never fails: on any error the
    /// original texts come back unchanged.
    pub async fn translate_or_original(&self, texts: &[String], source: Locale, target: Locale) -> Vec<String> {
        match self.translate(texts, source, target).await {
            Ok(translated) => translated,
            Err(e) => {
                tracing::warn!("Translation to {} failed, keeping original: {:#}", target.code(), e);
                texts.to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_translator() -> Translator {
        Translator::new(
            reqwest::Client::new(),
            TranslateConfig {
                api_key: "test".into(),
                api_url: "http://127.0.0.1:9".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_same_locale_is_passthrough() {
        let t = unreachable_translator();
        let texts = vec!["안녕".to_string()];
        assert_eq!(t.translate(&texts, Locale::Ko, Locale::Ko).await.unwrap(), texts);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_original() {
        let t = unreachable_translator();
        let texts = vec!["안녕".to_string(), "포토부스".to_string()];
        assert_eq!(t.translate_or_original(&texts, Locale::Ko, Locale::En).await, texts);
    }
}
