//! Text helpers: markup sanitizing and Telegram HTML rendering.

use chrono::{DateTime, Utc};
use scraper::Html;

use crate::{
    domain::{CycleOutcome, Listing, PollCycleResult},
    messaging::types::{InlineButton, InlineKeyboard},
};

/// Description budget inside one notification (Telegram caps messages at 4096 chars).
pub const MAX_DESCRIPTION_CHARS: usize = 3000;

/// Escape HTML special characters for Telegram.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Reduce an HTML fragment to plain text.
///
/// Every text node is split into lines, runs of whitespace are collapsed,
/// and the non-empty lines are joined with `\n`. Entities are decoded.
pub fn html_to_text(markup: &str) -> String {
    if markup.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(markup);
    fragment
        .root_element()
        .text()
        .flat_map(str::lines)
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Render a sanitized listing as a Telegram HTML message.
pub fn render_listing(listing: &Listing) -> String {
    let mut lines = Vec::new();

    let title = if listing.title.is_empty() {
        format!("Project #{}", listing.id)
    } else {
        listing.title.clone()
    };
    lines.push(format!(
        "<b><a href=\"{}\">{}</a></b>",
        escape_html(&listing.detail_url()),
        escape_html(&title)
    ));

    match (listing.price, listing.price_limit) {
        (Some(price), Some(limit)) if limit > price => {
            lines.push(format!("💰 Budget: <b>{price}</b> ₽ (up to {limit} ₽)"));
        }
        (Some(price), _) => lines.push(format!("💰 Budget: <b>{price}</b> ₽")),
        (None, _) => {}
    }

    if let Some(offers) = listing.offers_count {
        lines.push(format!("📨 Offers: {offers}"));
    }

    let mut buyer = Vec::new();
    if let Some(name) = &listing.author_name {
        buyer.push(escape_html(name));
    }
    if let Some(hired) = listing.author_hired_percent {
        buyer.push(format!("hired {hired}%"));
    }
    if let Some(count) = listing.author_projects_count {
        buyer.push(format!("{count} projects"));
    }
    if !buyer.is_empty() {
        lines.push(format!("👤 {}", buyer.join(", ")));
    }

    if let Some(posted) = listing.posted_at {
        lines.push(format!("🕐 Posted: {}", format_timestamp(posted)));
    }
    if let Some(expires) = listing.expires_at {
        lines.push(format!("⏳ Open until: {}", format_timestamp(expires)));
    }

    if !listing.description.is_empty() {
        lines.push(String::new());
        lines.push(escape_html(&truncate_chars(
            &listing.description,
            MAX_DESCRIPTION_CHARS,
        )));
    }

    lines.join("\n")
}

/// URL buttons attached to a listing notification.
pub fn listing_keyboard(listing: &Listing) -> InlineKeyboard {
    let mut row = vec![InlineButton::url("Send offer", listing.reply_url())];
    if let Some(url) = listing.author_url() {
        row.push(InlineButton::url("User profile", url));
    }
    InlineKeyboard::new(vec![row])
}

/// One-paragraph summary of a cycle for the operator's `/status`.
pub fn format_cycle_summary(result: &PollCycleResult) -> String {
    let when = format_timestamp(result.started_at);
    let took = (result.finished_at - result.started_at).num_seconds().max(0);
    match &result.outcome {
        CycleOutcome::Completed => format!(
            "Last cycle at {when} ({took}s): fetched {}, sent {}, skipped {}, failed {}",
            result.fetched, result.sent, result.skipped, result.failed
        ),
        CycleOutcome::Aborted { reason } => format!(
            "Last cycle at {when} aborted: {}",
            escape_html(&truncate_chars(reason, 300))
        ),
    }
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListingId, RawListing};
    use crate::messaging::types::ButtonAction;

    fn listing() -> Listing {
        Listing::from_raw(RawListing {
            id: Some(43),
            title: Some("Landing <page>".to_string()),
            description: Some("Fix & deploy".to_string()),
            price: Some(5000),
            possible_price_limit: Some(15000),
            offers: Some(3),
            username: Some("ann".to_string()),
            user_hired_percent: Some(80),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn html_to_text_normalizes_whitespace_and_entities() {
        let text = html_to_text("<div>  one\n\n   two  </div><p>a&amp;b&nbsp;c</p>");
        assert_eq!(text, "one\ntwo\na&b c");
        assert_eq!(html_to_text("   "), "");
        assert!(!html_to_text("<ul><li>x</li><li>y</li></ul>").contains('<'));
    }

    #[test]
    fn truncate_chars_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("привет", 10), "привет");
        assert_eq!(truncate_chars("привет", 4), "при…");
    }

    #[test]
    fn render_listing_escapes_and_links() {
        let html = render_listing(&listing());
        assert!(html.contains("https://kwork.ru/projects/43"));
        assert!(html.contains("Landing &lt;page&gt;"));
        assert!(html.contains("Fix &amp; deploy"));
        assert!(html.contains("up to 15000"));
        assert!(html.contains("hired 80%"));
    }

    #[test]
    fn keyboard_has_offer_and_profile_buttons() {
        let kb = listing_keyboard(&listing());
        assert_eq!(kb.rows.len(), 1);
        assert_eq!(kb.rows[0].len(), 2);
        assert_eq!(
            kb.rows[0][0].action,
            ButtonAction::Url("https://kwork.ru/new_offer?project=43".to_string())
        );

        let mut anonymous = listing();
        anonymous.id = ListingId(44);
        anonymous.author_name = None;
        assert_eq!(listing_keyboard(&anonymous).rows[0].len(), 1);
    }
}
