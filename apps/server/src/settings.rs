//! Admin-editable settings.
//!
//! Each key has its own typed value. Writes are validated per key and bump a
//! version counter; reads merge whatever was stored over explicit defaults,
//! so a partially filled locale still renders complete content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::auth::password_digest;
use crate::db::StoredSetting;
use crate::error::{AppError, AppResult};

pub const ADMIN_PASSWORD_KEY: &str = "adminPassword";
const LANGUAGES_KEY: &str = "languages";
const IMAGES_KEY: &str = "images";
const SMS_MESSAGE_KEY: &str = "smsMessage";
const CONTENT_PREFIX: &str = "content.";

const MIN_PASSWORD_LEN: usize = 4;
const MAX_SMS_LEN: usize = 500;
const MAX_CONTENT_FIELD_LEN: usize = 5000;

// ── Locales ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    Ko,
    En,
    Ja,
    Zh,
}

impl Locale {
    pub const ALL: [Locale; 4] = [Locale::Ko, Locale::En, Locale::Ja, Locale::Zh];
    pub const SOURCE: Locale = Locale::Ko;

    pub fn code(self) -> &'static str {
        match self {
            Locale::Ko => "ko",
            Locale::En => "en",
            Locale::Ja => "ja",
            Locale::Zh => "zh",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(code.trim()))
    }
}

// ── Keys ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Content(Locale),
    Languages,
    Images,
    AdminPassword,
    SmsMessage,
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingKey::Content(locale) => write!(f, "{}{}", CONTENT_PREFIX, locale.code()),
            SettingKey::Languages => f.write_str(LANGUAGES_KEY),
            SettingKey::Images => f.write_str(IMAGES_KEY),
            SettingKey::AdminPassword => f.write_str(ADMIN_PASSWORD_KEY),
            SettingKey::SmsMessage => f.write_str(SMS_MESSAGE_KEY),
        }
    }
}

impl FromStr for SettingKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            LANGUAGES_KEY => Ok(SettingKey::Languages),
            IMAGES_KEY => Ok(SettingKey::Images),
            ADMIN_PASSWORD_KEY => Ok(SettingKey::AdminPassword),
            SMS_MESSAGE_KEY => Ok(SettingKey::SmsMessage),
            other => other
                .strip_prefix(CONTENT_PREFIX)
                .and_then(Locale::parse)
                .map(SettingKey::Content)
                .ok_or_else(|| AppError::validation(format!("알 수 없는 설정 키입니다: {}", s))),
        }
    }
}

// ── Values ──

/// Landing page copy for one locale, as rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContent {
    pub hero_title: String,
    pub hero_subtitle: String,
    pub cta_label: String,
    pub about: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// What an admin saves for a locale: any subset of [`SiteContent`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SiteContentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero_subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cta_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl SiteContentPatch {
    fn fields_mut(&mut self) -> [&mut Option<String>; 6] {
        [
            &mut self.hero_title,
            &mut self.hero_subtitle,
            &mut self.cta_label,
            &mut self.about,
            &mut self.price_note,
            &mut self.notice,
        ]
    }

    /// Non-empty texts, in field order; used to batch translation.
    pub fn texts(&self) -> Vec<String> {
        [
            &self.hero_title,
            &self.hero_subtitle,
            &self.cta_label,
            &self.about,
            &self.price_note,
            &self.notice,
        ]
        .into_iter()
        .flatten()
        .filter(|t| !t.trim().is_empty())
        .cloned()
        .collect()
    }

    /// Replaces the texts returned by [`texts`](Self::texts) in the same order.
    pub fn with_texts(&self, translated: &[String]) -> Self {
        let mut out = self.clone();
        let mut iter = translated.iter();
        for field in out.fields_mut() {
            if let Some(text) = field {
                if !text.trim().is_empty() {
                    if let Some(t) = iter.next() {
                        *text = t.clone();
                    }
                }
            }
        }
        out
    }
}

impl SiteContent {
    pub fn defaults(locale: Locale) -> Self {
        let (hero_title, hero_subtitle, cta_label, about) = match locale {
            Locale::Ko => (
                "포토부스 대여",
                "특별한 날을 사진으로 남기세요",
                "예약 문의하기",
                "행사, 웨딩, 파티 어디든 찾아가는 포토부스입니다.",
            ),
            Locale::En => (
                "Photo Booth Rental",
                "Capture your special day",
                "Book now",
                "A photo booth that comes to your event, wedding or party.",
            ),
            Locale::Ja => (
                "フォトブースレンタル",
                "特別な日を写真に残しましょう",
                "予約する",
                "イベント、ウェディング、パーティーに出張するフォトブースです。",
            ),
            Locale::Zh => (
                "照相亭租赁",
                "用照片记录特别的日子",
                "立即预约",
                "活动、婚礼、派对，我们的照相亭随时到场。",
            ),
        };
        Self {
            hero_title: hero_title.into(),
            hero_subtitle: hero_subtitle.into(),
            cta_label: cta_label.into(),
            about: about.into(),
            price_note: None,
            notice: None,
        }
    }

    /// Stored overlay on top of the locale defaults. Blank strings count as unset.
    pub fn merged(locale: Locale, patch: Option<&SiteContentPatch>) -> Self {
        let mut content = Self::defaults(locale);
        let Some(patch) = patch else {
            return content;
        };
        let pick = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        if let Some(v) = pick(&patch.hero_title) {
            content.hero_title = v;
        }
        if let Some(v) = pick(&patch.hero_subtitle) {
            content.hero_subtitle = v;
        }
        if let Some(v) = pick(&patch.cta_label) {
            content.cta_label = v;
        }
        if let Some(v) = pick(&patch.about) {
            content.about = v;
        }
        content.price_note = pick(&patch.price_note).or(content.price_note);
        content.notice = pick(&patch.notice).or(content.notice);
        content
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero: Option<String>,
    #[serde(default)]
    pub gallery: Vec<String>,
}

fn validate_image_url(raw: &str) -> AppResult<()> {
    match url::Url::parse(raw) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
        _ => Err(AppError::validation(format!("이미지 주소가 올바르지 않습니다: {}", raw))),
    }
}

/// Renders the SMS template with the lead's details.
pub fn render_sms(template: &str, name: &str, date: &str, time: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{date}", date)
        .replace("{time}", time)
}

pub const DEFAULT_SMS_MESSAGE: &str =
    "{name}님, {date} {time} 포토부스 예약이 확정되었습니다. 감사합니다.";

/// Validates a raw value for `key` and returns the string to persist.
pub fn prepare_value(key: SettingKey, value: &Value) -> AppResult<String> {
    let invalid = |e: serde_json::Error| AppError::validation(format!("{} 값이 올바르지 않습니다: {}", key, e));

    match key {
        SettingKey::Content(_) => {
            let patch: SiteContentPatch = serde_json::from_value(value.clone()).map_err(invalid)?;
            let too_long = patch
                .texts()
                .iter()
                .any(|t| t.chars().count() > MAX_CONTENT_FIELD_LEN);
            if too_long {
                return Err(AppError::validation("문구가 너무 깁니다"));
            }
            Ok(serde_json::to_string(&patch).map_err(invalid)?)
        }
        SettingKey::Languages => {
            let mut locales: Vec<Locale> = serde_json::from_value(value.clone()).map_err(invalid)?;
            locales.sort();
            locales.dedup();
            if !locales.contains(&Locale::SOURCE) {
                return Err(AppError::validation("한국어(ko)는 항상 포함되어야 합니다"));
            }
            Ok(serde_json::to_string(&locales).map_err(invalid)?)
        }
        SettingKey::Images => {
            let images: ImageSettings = serde_json::from_value(value.clone()).map_err(invalid)?;
            images
                .hero
                .iter()
                .chain(images.gallery.iter())
                .try_for_each(|u| validate_image_url(u))?;
            Ok(serde_json::to_string(&images).map_err(invalid)?)
        }
        SettingKey::AdminPassword => {
            let password: String = serde_json::from_value(value.clone()).map_err(invalid)?;
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(AppError::validation(format!(
                    "비밀번호는 {}자 이상이어야 합니다",
                    MIN_PASSWORD_LEN
                )));
            }
            Ok(serde_json::to_string(&password_digest(&password)).map_err(invalid)?)
        }
        SettingKey::SmsMessage => {
            let text: String = serde_json::from_value(value.clone()).map_err(invalid)?;
            if text.chars().count() > MAX_SMS_LEN {
                return Err(AppError::validation(format!(
                    "문자 메시지는 {}자 이하여야 합니다",
                    MAX_SMS_LEN
                )));
            }
            Ok(serde_json::to_string(&text).map_err(invalid)?)
        }
    }
}

// ── Snapshot ──

#[derive(Debug, Clone, Serialize)]
pub struct VersionedContent {
    pub version: i64,
    pub content: SiteContent,
}

/// Everything the admin screen and the landing page read, defaults applied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub languages: Vec<Locale>,
    pub images: ImageSettings,
    pub sms_message: String,
    pub content: BTreeMap<Locale, VersionedContent>,
}

impl SettingsSnapshot {
    /// Builds the snapshot from stored rows; unreadable rows fall back to defaults.
    pub fn from_rows(rows: &[StoredSetting]) -> Self {
        let mut snapshot = SettingsSnapshot {
            languages: vec![Locale::SOURCE],
            images: ImageSettings::default(),
            sms_message: DEFAULT_SMS_MESSAGE.to_string(),
            content: Locale::ALL
                .into_iter()
                .map(|l| {
                    (
                        l,
                        VersionedContent {
                            version: 0,
                            content: SiteContent::defaults(l),
                        },
                    )
                })
                .collect(),
        };

        for row in rows {
            let Ok(key) = row.key.parse::<SettingKey>() else {
                tracing::warn!("Ignoring unknown setting key {}", row.key);
                continue;
            };
            let parsed = match key {
                SettingKey::Content(locale) => serde_json::from_str::<SiteContentPatch>(&row.value)
                    .map(|patch| {
                        snapshot.content.insert(
                            locale,
                            VersionedContent {
                                version: row.version,
                                content: SiteContent::merged(locale, Some(&patch)),
                            },
                        );
                    }),
                SettingKey::Languages => serde_json::from_str(&row.value).map(|l| snapshot.languages = l),
                SettingKey::Images => serde_json::from_str(&row.value).map(|i| snapshot.images = i),
                SettingKey::SmsMessage => serde_json::from_str(&row.value).map(|s| snapshot.sms_message = s),
                SettingKey::AdminPassword => Ok(()),
            };
            if let Err(e) = parsed {
                tracing::warn!("Setting {} is unreadable, using default: {}", row.key, e);
            }
        }
        snapshot
    }

    /// The requested locale when enabled, otherwise Korean.
    pub fn resolve_locale(&self, requested: Option<&str>) -> Locale {
        requested
            .and_then(Locale::parse)
            .filter(|l| self.languages.contains(l))
            .unwrap_or(Locale::SOURCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(key: &str, value: &str, version: i64) -> StoredSetting {
        StoredSetting {
            key: key.into(),
            value: value.into(),
            version,
        }
    }

    #[test]
    fn test_key_parse_and_display() {
        for key in [
            SettingKey::Content(Locale::Ja),
            SettingKey::Languages,
            SettingKey::Images,
            SettingKey::AdminPassword,
            SettingKey::SmsMessage,
        ] {
            assert_eq!(key.to_string().parse::<SettingKey>().unwrap(), key);
        }
        assert!("content.fr".parse::<SettingKey>().is_err());
        assert!("title".parse::<SettingKey>().is_err());
    }

    #[test]
    fn test_merge_overlays_only_set_fields() {
        let patch = SiteContentPatch {
            hero_title: Some("우리 포토부스".into()),
            about: Some("  ".into()),
            notice: Some("2월 휴무".into()),
            ..Default::default()
        };
        let merged = SiteContent::merged(Locale::Ko, Some(&patch));
        let defaults = SiteContent::defaults(Locale::Ko);
        assert_eq!(merged.hero_title, "우리 포토부스");
        assert_eq!(merged.about, defaults.about);
        assert_eq!(merged.cta_label, defaults.cta_label);
        assert_eq!(merged.notice.as_deref(), Some("2월 휴무"));
        assert!(merged.price_note.is_none());
    }

    #[test]
    fn test_content_rejects_unknown_fields() {
        let key = SettingKey::Content(Locale::Ko);
        assert!(prepare_value(key, &json!({"heroTitle": "x"})).is_ok());
        assert!(prepare_value(key, &json!({"heroTitel": "x"})).is_err());
        assert!(prepare_value(key, &json!("just a string")).is_err());
    }

    #[test]
    fn test_languages_must_include_korean() {
        assert!(prepare_value(SettingKey::Languages, &json!(["en", "ja"])).is_err());
        assert_eq!(
            prepare_value(SettingKey::Languages, &json!(["en", "ko", "en"])).unwrap(),
            r#"["ko","en"]"#
        );
        assert!(prepare_value(SettingKey::Languages, &json!(["fr", "ko"])).is_err());
    }

    #[test]
    fn test_images_require_http_urls() {
        assert!(prepare_value(
            SettingKey::Images,
            &json!({"hero": "https://cdn.example.com/a.jpg", "gallery": ["http://x.y/b.png"]})
        )
        .is_ok());
        assert!(prepare_value(SettingKey::Images, &json!({"gallery": ["ftp://x/y"]})).is_err());
        assert!(prepare_value(SettingKey::Images, &json!({"hero": "not a url"})).is_err());
    }

    #[test]
    fn test_password_stored_as_digest() {
        let stored = prepare_value(SettingKey::AdminPassword, &json!("s3cret")).unwrap();
        assert_eq!(stored, format!("\"{}\"", password_digest("s3cret")));
        assert!(prepare_value(SettingKey::AdminPassword, &json!("abc")).is_err());
    }

    #[test]
    fn test_sms_length_limit() {
        assert!(prepare_value(SettingKey::SmsMessage, &json!("안녕하세요")).is_ok());
        let long = "가".repeat(MAX_SMS_LEN + 1);
        assert!(prepare_value(SettingKey::SmsMessage, &json!(long)).is_err());
    }

    #[test]
    fn test_snapshot_defaults_and_overlay() {
        let rows = vec![
            row("content.en", r#"{"heroTitle":"Snap!"}"#, 3),
            row("languages", r#"["ko","en"]"#, 1),
            row("adminPassword", r#""abc""#, 1),
            row("images", "{broken", 1),
        ];
        let snap = SettingsSnapshot::from_rows(&rows);
        assert_eq!(snap.languages, vec![Locale::Ko, Locale::En]);
        assert_eq!(snap.content[&Locale::En].version, 3);
        assert_eq!(snap.content[&Locale::En].content.hero_title, "Snap!");
        assert_eq!(snap.content[&Locale::Ja].version, 0);
        assert_eq!(snap.images, ImageSettings::default());
        assert_eq!(snap.sms_message, DEFAULT_SMS_MESSAGE);

        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("adminPassword").is_none());
    }

    #[test]
    fn test_resolve_locale_falls_back_to_korean() {
        let snap = SettingsSnapshot::from_rows(&[row("languages", r#"["ko","en"]"#, 1)]);
        assert_eq!(snap.resolve_locale(Some("EN")), Locale::En);
        assert_eq!(snap.resolve_locale(Some("ja")), Locale::Ko);
        assert_eq!(snap.resolve_locale(Some("xx")), Locale::Ko);
        assert_eq!(snap.resolve_locale(None), Locale::Ko);
    }

    #[test]
    fn test_patch_text_replacement_keeps_order() {
        let patch = SiteContentPatch {
            hero_title: Some("제목".into()),
            cta_label: Some("".into()),
            about: Some("소개".into()),
            ..Default::default()
        };
        assert_eq!(patch.texts(), vec!["제목".to_string(), "소개".to_string()]);
        let translated = patch.with_texts(&["Title".into(), "About".into()]);
        assert_eq!(translated.hero_title.as_deref(), Some("Title"));
        assert_eq!(translated.cta_label.as_deref(), Some(""));
        assert_eq!(translated.about.as_deref(), Some("About"));
    }

    #[test]
    fn test_render_sms() {
        assert_eq!(
            render_sms("{name}님 {date} {time}", "김철수", "2026-02-02", "10:00"),
            "김철수님 2026-02-02 10:00"
        );
    }
}
