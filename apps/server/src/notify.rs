use anyhow::Context;

use crate::config::MailConfig;
use crate::models::Lead;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Transactional email through the Resend HTTP API.
#[derive(Clone)]
pub struct Mailer {
    http: reqwest::Client,
    config: MailConfig,
}

impl Mailer {
    pub fn new(http: reqwest::Client, config: MailConfig) -> Self {
        Self { http, config }
    }

    pub async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "from": self.config.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .context("email request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("email API error: {} - {}", status, text);
        }
        Ok(())
    }

    /// New-lead notice to the admin inbox with a one-click confirm link.
    pub async fn notify_new_lead(&self, lead: &Lead, confirm_url: &str, sms_text: &str) -> anyhow::Result<()> {
        let subject = format!("[예약 문의] {} ({})", lead.name, lead.phone);
        let html = lead_email_html(lead, confirm_url, sms_text);
        self.send(&self.config.admin_to, &subject, &html).await?;
        tracing::info!("Lead {} notification sent", lead.id);
        Ok(())
    }
}

pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn lead_email_html(lead: &Lead, confirm_url: &str, sms_text: &str) -> String {
    let booking = match (&lead.booking_date, &lead.booking_time) {
        (Some(d), Some(t)) => format!("{} {}", d, t),
        _ => "미지정".to_string(),
    };
    format!(
        "<h2>새 예약 문의</h2>\
         <table>\
         <tr><td>이름</td><td>{name}</td></tr>\
         <tr><td>연락처</td><td>{phone}</td></tr>\
         <tr><td>지역</td><td>{region}</td></tr>\
         <tr><td>예약 일시</td><td>{booking}</td></tr>\
         <tr><td>메모</td><td>{memo}</td></tr>\
         <tr><td>접수 시각</td><td>{created}</td></tr>\
         </table>\
         <p><a href=\"{confirm}\">예약 확정하기</a></p>\
         <p>고객 안내 문자:</p><pre>{sms}</pre>",
        name = escape_html(&lead.name),
        phone = escape_html(&lead.phone),
        region = escape_html(&lead.region),
        booking = escape_html(&booking),
        memo = escape_html(&lead.memo),
        created = escape_html(&lead.created_at),
        confirm = escape_html(confirm_url),
        sms = escape_html(sms_text),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> Lead {
        Lead {
            id: 7,
            created_at: "2026-01-20T10:00:00+09:00".into(),
            name: "<b>김철수</b>".into(),
            phone: "010-1234-5678".into(),
            region: "서울".into(),
            booking_date: Some("2026-02-02".into()),
            booking_time: Some("10:00".into()),
            memo: String::new(),
            user_agent: String::new(),
            referer: String::new(),
            status: "대기".into(),
            admin_memo: String::new(),
        }
    }

    #[test]
    fn test_email_escapes_user_input() {
        let html = lead_email_html(&lead(), "https://x/confirm?id=7&secret=ab", "sms");
        assert!(html.contains("&lt;b&gt;김철수&lt;/b&gt;"));
        assert!(html.contains("id=7&amp;secret=ab"));
        assert!(html.contains("2026-02-02 10:00"));
    }

    #[test]
    fn test_email_without_booking() {
        let mut l = lead();
        l.booking_date = None;
        l.booking_time = None;
        assert!(lead_email_html(&l, "u", "s").contains("미지정"));
    }
}
