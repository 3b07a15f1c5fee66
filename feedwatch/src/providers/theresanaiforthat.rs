use super::{number_emoji, Provider, ProviderContext, ProviderMessage, PROVIDER_ITEM_CAP};
use crate::html::collapse_whitespace;
use crate::locale::{base_language, persian_digits};
use crate::types::{FeedwatchError, Result, SubscriberId};
use crate::urls::site_host;
use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_text};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

static CARD: Lazy<Selector> = Lazy::new(|| Selector::parse("li.li").unwrap());
static SHORT_DESC: Lazy<Selector> = Lazy::new(|| Selector::parse(".short_desc").unwrap());
static RATING: Lazy<Selector> = Lazy::new(|| Selector::parse(".average_rating").unwrap());
static LAUNCH_DATE: Lazy<Selector> = Lazy::new(|| Selector::parse(".ai_launch_date").unwrap());
static AI_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse(".ai_link").unwrap());

const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiTool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub task: String,
    pub rating: String,
    pub launched: String,
    pub link: Option<String>,
}

fn child_text(card: ElementRef<'_>, selector: &Selector) -> String {
    card.select(selector)
        .next()
        .map(|e| collapse_whitespace(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

fn absolutize(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

/// Tool cards of a listing page, deduplicated by id in page order.
pub fn parse_cards(html: &str, base: &str) -> Vec<AiTool> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut tools = Vec::new();

    for card in doc.select(&CARD) {
        let attr = |name: &str| card.value().attr(name).map(collapse_whitespace).filter(|v| !v.is_empty());
        let external = attr("data-url").and_then(|u| absolutize(&u, &base_url));
        let internal = card
            .select(&AI_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| absolutize(href, &base_url));
        let link = external.or(internal);

        let name = attr("data-name");
        let Some(id) = name.clone().or_else(|| link.clone()) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        tools.push(AiTool {
            id,
            name: name.unwrap_or_else(|| PLACEHOLDER.to_string()),
            description: child_text(card, &SHORT_DESC),
            task: attr("data-task").unwrap_or_else(|| PLACEHOLDER.to_string()),
            rating: child_text(card, &RATING),
            launched: child_text(card, &LAUNCH_DATE),
            link,
        });
    }
    tools
}

fn format_tools(tools: &[&AiTool], locale: &str) -> String {
    let persian = base_language(locale) == "fa";
    let header = if persian {
        format!("🧠 {} ابزار جدید در There's An AI For That", persian_digits(&tools.len().to_string()))
    } else {
        format!("🧠 {} new tools on There's An AI For That", tools.len())
    };
    let view = if persian { "مشاهده ابزار" } else { "View tool" };

    let cards: Vec<String> = tools
        .iter()
        .enumerate()
        .map(|(index, tool)| {
            let mut lines = vec![
                format!("{} <b>{}</b>", number_emoji(index + 1), encode_text(&tool.name)),
                format!("📝 {}", encode_text(&tool.description)),
                format!("🏷️ {}", encode_text(&tool.task)),
                format!("⭐ {}", encode_text(&tool.rating)),
                format!("🗓 {}", encode_text(&tool.launched)),
            ];
            if let Some(link) = &tool.link {
                lines.push(format!("🔗 <a href=\"{}\">{}</a>", encode_double_quoted_attribute(link), view));
            }
            lines.join("\n")
        })
        .collect();

    format!("{}\n\n{}", header, cards.join("\n\n"))
}

/// Newly listed tools on theresanaiforthat.com.
pub struct TheresAnAiForThatProvider;

#[async_trait]
impl Provider for TheresAnAiForThatProvider {
    fn name(&self) -> &'static str {
        "theresanaiforthat"
    }

    fn seen_prefix(&self) -> &'static str {
        "taaft::"
    }

    fn matches(&self, url: &str) -> bool {
        site_host(url).map(|h| h == "theresanaiforthat.com").unwrap_or(false)
    }

    async fn render(
        &self,
        ctx: ProviderContext<'_>,
        subscriber_id: SubscriberId,
        url: &str,
        locale: &str,
    ) -> Result<Option<ProviderMessage>> {
        let html = ctx.fetcher.fetch_html(url).await;
        if html.is_empty() {
            return Err(FeedwatchError::Provider {
                provider: self.name().to_string(),
                message: format!("empty page at {}", url),
            });
        }
        let tools = parse_cards(&html, url);
        if tools.is_empty() {
            debug!("No tool cards found at {}", url);
            return Ok(None);
        }

        let namespace = self.seen_namespace(url);
        let seen = ctx.store.get_seen(subscriber_id, &namespace).await?;
        let fresh: Vec<&AiTool> = tools
            .iter()
            .filter(|t| !seen.contains(&t.id))
            .take(PROVIDER_ITEM_CAP)
            .collect();
        if fresh.is_empty() {
            return Ok(None);
        }

        Ok(Some(ProviderMessage {
            text: format_tools(&fresh, locale),
            seen_namespace: namespace,
            item_ids: fresh.iter().map(|t| t.id.clone()).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body><ul>
        <li class="li" data-name="PaperPal" data-task="Writing" data-url="https://paperpal.example/?ref=taaft">
            <a class="ai_link" href="/ai/paperpal/">PaperPal</a>
            <div class="short_desc">Polishes academic drafts.</div>
            <span class="average_rating">4.6</span>
            <span class="ai_launch_date">Released 2d ago</span>
        </li>
        <li class="li" data-name="PaperPal" data-task="Writing"></li>
        <li class="li" data-task="Audio"><a class="ai_link" href="/ai/hushnote/">Hushnote</a></li>
    </ul></body></html>"#;

    #[test]
    fn parses_cards_and_prefers_external_links() {
        let tools = parse_cards(LISTING, "https://theresanaiforthat.com/");
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "PaperPal");
        assert_eq!(tools[0].description, "Polishes academic drafts.");
        assert_eq!(tools[0].rating, "4.6");
        assert_eq!(tools[0].link.as_deref(), Some("https://paperpal.example/?ref=taaft"));
        assert_eq!(tools[1].id, "https://theresanaiforthat.com/ai/hushnote/");
        assert_eq!(tools[1].rating, "-");
    }

    #[test]
    fn formats_numbered_cards() {
        let tools = parse_cards(LISTING, "https://theresanaiforthat.com/");
        let refs: Vec<&AiTool> = tools.iter().collect();
        let text = format_tools(&refs, "en");
        assert!(text.starts_with("🧠 2 new tools on There's An AI For That"));
        assert!(text.contains("1\u{FE0F}\u{20E3} <b>PaperPal</b>"));
        assert!(text.contains("🔗 <a href=\"https://paperpal.example/?ref=taaft\">View tool</a>"));
    }
}
