//! Minimal server-rendered HTML and the JSON shape of history rows.

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{json, Value};

use crate::diary::{Bot, Entry, HistoryPage, Payload};
use crate::registry::BotRegistry;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Display time of an entry in the writer's offset, falling back to UTC.
fn local_time(entry: &Entry) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(&entry.fields.created_local)
        .unwrap_or_else(|_| entry.fields.created.fixed_offset())
}

/// `2024-03-01 Fri 09:30`, plus the subject's age when a birthdate is known.
pub fn pretty_date(at: DateTime<FixedOffset>, birthdate: Option<DateTime<Utc>>) -> String {
    let mut msg = at.format("%Y-%m-%d %a %H:%M").to_string();
    if let Some(born) = birthdate {
        let days = (at.with_timezone(&Utc) - born).num_days();
        let mut age = format!("{:.1} years", days as f64 / 365.0);
        if days < 2 * 365 {
            age.push_str(&format!(", or {:.1} months,", days as f64 / 30.4));
        }
        msg.push_str(&format!(" ({age} old)"));
    }
    msg
}

/// Text shown for an entry's content.
pub fn message(bot: &Bot, entry: &Entry) -> String {
    match entry.payload() {
        Some(Payload::Text(text)) => text.clone(),
        Some(Payload::Structured(kvs)) => {
            let words = bot.structured().english(kvs);
            if words.is_empty() {
                bot.structured().describe(kvs)
            } else {
                format!("[si] {words}")
            }
        }
        None => "(deleted)".to_string(),
    }
}

/// JSON view of one row, keyed the way the diary has always published it.
pub fn entry_json(bot: &Bot, entry: &Entry) -> Value {
    let mut row = json!({
        "uri": bot.entry_uri(&entry.id),
        "dc:created": entry.fields.created_local,
        "dc:creator": entry.fields.creator,
    });
    match entry.payload() {
        Some(Payload::Text(text)) => row["sioc:content"] = json!(text),
        Some(Payload::Structured(kvs)) => row["structuredInput"] = json!(kvs),
        None => {}
    }
    row
}

/// The `<tr>` rows of a history page.
pub fn rows_html(bot: &Bot, registry: &BotRegistry, rows: &[Entry]) -> String {
    let mut html = String::new();
    for entry in rows {
        let uri = bot.entry_uri(&entry.id);
        html.push_str(&format!(
            "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>\n",
            escape(&uri),
            escape(&pretty_date(local_time(entry), bot.birthdate())),
            escape(registry.display_name(&entry.fields.creator)),
            escape(&message(bot, entry)),
        ));
    }
    html
}

/// Full history page: links to the other queries, then the rows.
pub fn history_page(bot: &Bot, registry: &BotRegistry, page: &HistoryPage) -> String {
    let mut links = String::new();
    for other in &page.other_queries {
        links.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>",
            escape(&other.link_from(&page.query)),
            escape(&other.desc),
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{name} {desc}</title></head>\n\
         <body><p><a href=\"{home}\">diarybot</a></p>\n<h1>{name}: {desc}</h1>\n\
         <ul>{links}</ul>\n<table>\n{rows}</table></body></html>\n",
        name = escape(bot.name()),
        desc = escape(&page.query.desc),
        home = escape(&page.query.home_link()),
        rows = rows_html(bot, registry, &page.rows),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }

    #[test]
    fn pretty_date_without_birthdate() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T09:30:00-08:00").unwrap();
        assert_eq!(pretty_date(at, None), "2024-03-01 Fri 09:30");
    }

    #[test]
    fn young_subject_gets_months_too() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T09:30:00+00:00").unwrap();
        let born = DateTime::parse_from_rfc3339("2023-03-02T00:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            pretty_date(at, Some(born)),
            "2024-03-01 Fri 09:30 (1.0 years, or 12.0 months, old)"
        );
    }

    #[test]
    fn older_subject_gets_years_only() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T09:30:00+00:00").unwrap();
        let born = DateTime::parse_from_rfc3339("2020-03-01T00:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(pretty_date(at, Some(born)), "2024-03-01 Fri 09:30 (4.0 years old)");
    }
}
