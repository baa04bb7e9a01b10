use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;

pub const SUPPORTED_LANGUAGES: [&str; 5] = ["de", "en", "es", "ru", "hy"];
pub const DEFAULT_LANGUAGE: &str = "de";
pub const FALLBACK_LANGUAGE: &str = "en";

// Locale dictionaries ship inside the binary, the same way the SQL
// migrations do.
const LOCALE_SOURCES: &[(&str, &str)] = &[
    ("de", include_str!("../locales/de.json")),
    ("en", include_str!("../locales/en.json")),
    ("es", include_str!("../locales/es.json")),
    ("ru", include_str!("../locales/ru.json")),
    ("hy", include_str!("../locales/hy.json")),
];

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GrammarDictionary {
    pub grammar: GrammarMeta,
    pub sections: Vec<GrammarSection>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GrammarMeta {
    pub title: String,
    pub sidebar_label: Option<String>,
    pub ui: HashMap<String, String>,
    pub overview: HashMap<String, String>,
    pub breadcrumbs: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GrammarSection {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub subtopics: Vec<GrammarSubtopic>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GrammarSubtopic {
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub blocks: Vec<String>,
    pub takeaways: Vec<String>,
}

fn dictionaries() -> &'static HashMap<&'static str, GrammarDictionary> {
    static DICTS: OnceLock<HashMap<&'static str, GrammarDictionary>> = OnceLock::new();
    DICTS.get_or_init(|| {
        let mut map = HashMap::new();
        for (locale, source) in LOCALE_SOURCES {
            match serde_json::from_str::<GrammarDictionary>(source) {
                Ok(dict) => {
                    map.insert(*locale, dict);
                }
                Err(e) => {
                    tracing::error!("Unable to load locale file for {}: {}", locale, e);
                }
            }
        }
        map
    })
}

/// Lowercase and keep only supported locales.
pub fn normalize_language(language: &str) -> Option<&'static str> {
    let value = language.trim().to_lowercase();
    SUPPORTED_LANGUAGES.iter().copied().find(|l| *l == value)
}

/// Pick the UI locale for a request. Preference order: explicit query
/// override, stored session value, negotiated Accept-Language header,
/// default. The second tuple element tells the caller whether the choice
/// came from the query and must be persisted into the session.
pub fn determine_locale(
    query_lang: Option<&str>,
    session_locale: Option<&str>,
    accept_language: Option<&str>,
) -> (&'static str, bool) {
    if let Some(lang) = query_lang.and_then(normalize_language) {
        return (lang, true);
    }

    if let Some(lang) = session_locale.and_then(normalize_language) {
        return (lang, false);
    }

    if let Some(header) = accept_language {
        if let Some(lang) = negotiate_accept_language(header) {
            return (lang, false);
        }
    }

    (DEFAULT_LANGUAGE, false)
}

/// First supported language from an Accept-Language header, honoring
/// q-values and matching on the primary subtag (en-US -> en).
fn negotiate_accept_language(header: &str) -> Option<&'static str> {
    let mut candidates: Vec<(f32, &str)> = header
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let tag = parts.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let q = parts
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((q, tag))
        })
        .collect();

    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    candidates.into_iter().find_map(|(_, tag)| {
        let primary = tag.split('-').next().unwrap_or(tag);
        normalize_language(primary)
    })
}

/// Dictionary for a locale with two-level fallback: requested locale,
/// then the fallback language, then the default.
pub fn dictionary(locale: &str) -> &'static GrammarDictionary {
    static EMPTY: OnceLock<GrammarDictionary> = OnceLock::new();
    let dicts = dictionaries();
    normalize_language(locale)
        .and_then(|l| dicts.get(l))
        .or_else(|| dicts.get(FALLBACK_LANGUAGE))
        .or_else(|| dicts.get(DEFAULT_LANGUAGE))
        .unwrap_or_else(|| EMPTY.get_or_init(GrammarDictionary::default))
}

pub fn grammar_meta(locale: &str) -> &'static GrammarMeta {
    &dictionary(locale).grammar
}

pub fn grammar_sections(locale: &str) -> &'static [GrammarSection] {
    &dictionary(locale).sections
}

pub fn section(locale: &str, slug: &str) -> Option<&'static GrammarSection> {
    grammar_sections(locale).iter().find(|s| s.slug == slug)
}

pub fn subtopic(
    locale: &str,
    section_slug: &str,
    subtopic_slug: &str,
) -> Option<&'static GrammarSubtopic> {
    section(locale, section_slug)?
        .subtopics
        .iter()
        .find(|s| s.slug == subtopic_slug)
}
