use chrono::DateTime;
use chrono::FixedOffset;

/// How timestamps are rendered, picked from the configured locale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateStyle {
    /// `2024-01-31 14:05:09 UTC`
    #[default]
    Iso,
    /// `1/31/2024, 2:05:09 PM UTC`
    Us,
}

impl DateStyle {
    #[must_use]
    pub fn from_locale(locale: &str) -> Self {
        match locale.trim() {
            "en-US" | "en_US" | "en" => DateStyle::Us,
            "" => DateStyle::Iso,
            other => {
                tracing::debug!(locale = other, "No date style for locale, using ISO-8601");
                DateStyle::Iso
            }
        }
    }
}

/// GitHub sends RFC 3339 (`2024-01-31T14:05:09Z`), Jira a compact offset
/// with milliseconds (`2024-01-31T14:05:09.000+0000`).
const JIRA_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

fn parse(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, JIRA_FORMAT))
        .ok()
}

/// Render a tracker timestamp in the offset it was sent with. Unparseable
/// input is shown as is.
pub fn format_timestamp(raw: &str, style: DateStyle) -> String {
    let Some(timestamp) = parse(raw) else {
        return raw.to_string();
    };

    let zone = if timestamp.offset().local_minus_utc() == 0 {
        "UTC".to_string()
    } else {
        timestamp.format("%z").to_string()
    };
    let pattern = match style {
        DateStyle::Iso => "%Y-%m-%d %H:%M:%S",
        DateStyle::Us => "%-m/%-d/%Y, %-I:%M:%S %p",
    };

    format!("{} {zone}", timestamp.format(pattern))
}
