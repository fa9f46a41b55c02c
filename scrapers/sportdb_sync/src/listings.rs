use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const BLOCK_SELECTOR: &str = ".event__title, .event__match";
const TITLE_CLASS: &str = "event__title";
const HOME_TEAM_SELECTOR: &str = ".event__participant--home";
const AWAY_TEAM_SELECTOR: &str = ".event__participant--away";
const HOME_SCORE_SELECTOR: &str = ".event__score--home";
const AWAY_SCORE_SELECTOR: &str = ".event__score--away";
const STATUS_SELECTORS: &[&str] = &[".event__stage", ".event__time"];
const ID_ATTRIBUTES: &[&str] = &["id", "data-id"];
const ID_PREFIX: &str = "g_1_";

/// A status fragment that marks a listed match as in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveMarker {
    pub marker: &'static str,
    pub meaning: &'static str,
}

/// Checked in order against the lowercased status text.
pub const LIVE_MARKERS: &[LiveMarker] = &[
    LiveMarker { marker: "'", meaning: "minute" },
    LiveMarker { marker: "meio", meaning: "half-time" },
    LiveMarker { marker: "int", meaning: "interval" },
    LiveMarker { marker: "ao vivo", meaning: "live" },
];

pub fn detect_live(status: &str) -> Option<&'static LiveMarker> {
    let status = status.to_lowercase();
    LIVE_MARKERS.iter().find(|rule| status.contains(rule.marker))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListedMatch {
    pub id: String,
    pub league: Option<String>,
    pub status: String,
    pub is_live: bool,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub match_url: Option<String>,
}

fn jogo_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"/jogo/([^/?#]+)").ok())
        .as_ref()
}

/// Identifier segment following `/jogo/` in a match URL.
pub fn id_from_match_url(url: &str) -> Option<String> {
    jogo_pattern()?
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn strip_id_prefix(raw: &str) -> String {
    raw.strip_prefix(ID_PREFIX).unwrap_or(raw).to_string()
}

fn text_of(block: ElementRef<'_>, selector: &Selector) -> Option<String> {
    block
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

fn resolve_url(base: Option<&Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(String::from),
        None => Url::parse(href).ok().map(String::from),
    }
}

struct BlockSelectors {
    blocks: Selector,
    home_team: Selector,
    away_team: Selector,
    home_score: Selector,
    away_score: Selector,
    status: Vec<Selector>,
    link: Selector,
}

impl BlockSelectors {
    fn new() -> Option<Self> {
        Some(Self {
            blocks: Selector::parse(BLOCK_SELECTOR).ok()?,
            home_team: Selector::parse(HOME_TEAM_SELECTOR).ok()?,
            away_team: Selector::parse(AWAY_TEAM_SELECTOR).ok()?,
            home_score: Selector::parse(HOME_SCORE_SELECTOR).ok()?,
            away_score: Selector::parse(AWAY_SCORE_SELECTOR).ok()?,
            status: STATUS_SELECTORS
                .iter()
                .filter_map(|rule| Selector::parse(rule).ok())
                .collect(),
            link: Selector::parse("a").ok()?,
        })
    }
}

/// Extracts the matches of a listing page, one per `.event__match` block.
/// Each block belongs to the league named by the closest preceding title.
pub fn parse_listing(html: &str, base_url: &str) -> Vec<ListedMatch> {
    let Some(selectors) = BlockSelectors::new() else {
        return Vec::new();
    };
    let base = Url::parse(base_url).ok();
    let document = Html::parse_document(html);

    let mut league: Option<String> = None;
    let mut matches = Vec::new();

    for block in document.select(&selectors.blocks) {
        if block.value().classes().any(|class| class == TITLE_CLASS) {
            let title = block.text().collect::<String>().trim().to_string();
            league = (!title.is_empty()).then_some(title);
            continue;
        }

        let (Some(home_team), Some(away_team)) = (
            text_of(block, &selectors.home_team),
            text_of(block, &selectors.away_team),
        ) else {
            continue;
        };

        let status = selectors
            .status
            .iter()
            .find_map(|selector| text_of(block, selector))
            .unwrap_or_default();

        let match_url = block
            .select(&selectors.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve_url(base.as_ref(), href));

        let raw_id = ID_ATTRIBUTES
            .iter()
            .filter_map(|attr| block.value().attr(attr))
            .map(str::trim)
            .find(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| match_url.as_deref().and_then(id_from_match_url));
        let Some(raw_id) = raw_id else {
            continue;
        };

        matches.push(ListedMatch {
            id: strip_id_prefix(&raw_id),
            league: league.clone(),
            is_live: detect_live(&status).is_some(),
            status,
            home_team,
            away_team,
            home_score: text_of(block, &selectors.home_score).and_then(|s| s.parse().ok()),
            away_score: text_of(block, &selectors.away_score).and_then(|s| s.parse().ok()),
            match_url,
        });
    }

    matches
}

/// Statistics page for a period, relative to the match detail URL.
pub fn stats_page_url(match_url: &str, page_index: u8) -> Option<String> {
    let mut base = match_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .ok()?
        .join(&format!("sumario/estatisticas/{}/", page_index))
        .ok()
        .map(String::from)
}
