//! Email templates for magic-link delivery.

use chrono::{DateTime, Utc};
use signoff_storage::EvidenceKind;

/// Content for the supervisor's sign-off request.
pub struct MagicLinkEmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl MagicLinkEmailContent {
    pub fn new(
        kind: EvidenceKind,
        trainee_name: &str,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let expires = expires_at.format("%d %b %Y %H:%M UTC").to_string();
        Self {
            subject: format!("{} sign-off requested by {}", kind.as_str(), trainee_name),
            text: Self::text_template(kind, trainee_name, url, &expires),
            html: Self::html_template(kind, &escape(trainee_name), &escape(url), &expires),
        }
    }

    fn text_template(kind: EvidenceKind, trainee: &str, url: &str, expires: &str) -> String {
        format!(
            r#"Hello,

{trainee} has asked you to review and sign off a {label} ({code}).

Open the assessment here:
{url}

You can open the link, save your progress and come back to it before it expires.
The link expires on {expires} and stops working once you sign off.

If you were not expecting this request, you can ignore this email.

--
Portfolio Sign-off"#,
            trainee = trainee,
            label = kind.label(),
            code = kind.as_str(),
            url = url,
            expires = expires,
        )
    }

    fn html_template(kind: EvidenceKind, trainee: &str, url: &str, expires: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 0; background: #f5f5f5; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 40px 20px; }}
        .card {{ background: white; border-radius: 8px; padding: 40px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
        h1 {{ color: #1a1a1a; margin-top: 0; font-size: 22px; }}
        .button {{ display: inline-block; background: #005eb8; color: white; padding: 12px 24px; border-radius: 6px; text-decoration: none; font-weight: bold; }}
        .expires {{ color: #666; font-size: 14px; }}
        .footer {{ margin-top: 32px; padding-top: 20px; border-top: 1px solid #eee; color: #888; font-size: 12px; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <h1>{code} sign-off requested</h1>
            <p>{trainee} has asked you to review and sign off a <strong>{label}</strong>.</p>
            <p><a class="button" href="{url}">Review assessment</a></p>
            <p class="expires">This link expires on {expires} and stops working once you sign off.</p>
            <div class="footer">
                <p>If the button does not work, copy this address into your browser:<br>{url}</p>
                <p>If you were not expecting this request, you can ignore this email.</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
            code = kind.as_str(),
            trainee = trainee,
            label = kind.label(),
            url = url,
            expires = expires,
        )
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
