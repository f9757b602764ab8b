//! Search prompt construction.
//!
//! Prompts are written in the source's own language so the model searches
//! and summarizes in it, and always end with the strict JSON format block.
//! Manufacturer searches are industry-wide and use English.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::locale::LocalizedText;
use crate::store::{Manufacturer, Source};

/// Extract a bare domain for `site:`-style search restriction.
/// `https://www.ejarn.com/category/news` → `ejarn.com`.
pub fn extract_domain(raw: &str) -> Option<String> {
    let host = match Url::parse(raw) {
        Ok(url) => url.host_str().map(|h| h.to_string()),
        Err(_) => {
            static HOST_RE: OnceLock<Regex> = OnceLock::new();
            let re = HOST_RE
                .get_or_init(|| Regex::new(r"^(?:https?://)?([^/\s]+)").expect("static regex"));
            re.captures(raw).map(|c| c[1].to_string())
        }
    }?;
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

struct Templates {
    main: &'static str,
    period: &'static str,
    json_format: &'static str,
}

fn templates(language: &str) -> &'static Templates {
    match language {
        "ru" => &RU,
        "de" => &DE,
        "pt" => &PT,
        _ => &EN,
    }
}

static EN: Templates = Templates {
    main: "Find all news on the website {url} ({name}) for the period from {start} to {end} \
inclusive.\n\nUse web search to find news. Look for all articles, publications, press releases \
and news published on the website in the specified period. For each found news item, provide \
the title, the news text (1-2 paragraphs) and the source link.",
    period: "Search period: from {start} to {end} inclusive.",
    json_format: r#"Return the answer STRICTLY in JSON format (JSON only, without additional text):

{
  "news": [
    {
      "title": {
        "en": "News title in English",
        "ru": "Заголовок новости на русском"
      },
      "summary": {
        "en": "News text in English (1-2 paragraphs), written directly, as a journalist, in third person.",
        "ru": "Текст новости на русском языке (1-2 абзаца), написанный напрямую, как журналистом, от третьего лица."
      },
      "source_url": "https://example.com/news/article"
    }
  ]
}

If no news is found, return: {"news": []}

Return ONLY JSON, without additional comments or explanations."#,
};

static RU: Templates = Templates {
    main: "Найди на сайте {url} ({name}) все новости за период с {start} по {end} включительно.\n\n\
Используй веб-поиск. Ищи все статьи, публикации, пресс-релизы и новости, опубликованные на сайте \
за указанный период. Для каждой найденной новости укажи заголовок, текст новости (1-2 абзаца) и \
ссылку на источник.",
    period: "Период поиска: с {start} по {end} включительно.",
    json_format: r#"Верни ответ СТРОГО в формате JSON (только JSON, без дополнительного текста):

{
  "news": [
    {
      "title": "Заголовок новости на русском",
      "summary": "Текст новости на русском языке (1-2 абзаца). Пиши новость напрямую, как журналист, от третьего лица.",
      "source_url": "https://example.com/news/article"
    }
  ]
}

Если новостей нет, верни: {"news": []}

Верни ТОЛЬКО JSON, без дополнительных комментариев или объяснений."#,
};

static DE: Templates = Templates {
    main: "Finde alle Nachrichten auf der Website {url} ({name}) für den Zeitraum vom {start} \
bis {end} einschließlich.\n\nVerwende die Websuche. Suche nach allen Artikeln, \
Veröffentlichungen, Pressemitteilungen und Nachrichten, die im angegebenen Zeitraum auf der \
Website veröffentlicht wurden. Gib für jede gefundene Nachricht den Titel, den Nachrichtentext \
(1-2 Absätze) und den Quelllink an.",
    period: "Suchzeitraum: vom {start} bis {end} einschließlich.",
    json_format: r#"Gib die Antwort STRENG im JSON-Format zurück (nur JSON, ohne zusätzlichen Text):

{
  "news": [
    {
      "title": {
        "de": "Nachrichtentitel auf Deutsch",
        "ru": "Заголовок новости на русском"
      },
      "summary": {
        "de": "Nachrichtentext auf Deutsch (1-2 Absätze), direkt geschrieben, als Journalist, in der dritten Person.",
        "ru": "Текст новости на русском языке (1-2 абзаца)."
      },
      "source_url": "https://example.com/news/article"
    }
  ]
}

Wenn keine Nachrichten gefunden wurden, gib zurück: {"news": []}

Gib NUR JSON zurück, ohne zusätzliche Kommentare oder Erklärungen."#,
};

static PT: Templates = Templates {
    main: "Encontre todas as notícias no site {url} ({name}) para o período de {start} a {end} \
inclusive.\n\nUse a pesquisa na web. Procure todos os artigos, publicações, comunicados de \
imprensa e notícias publicados no site no período especificado. Para cada notícia encontrada, \
forneça o título, o texto da notícia (1-2 parágrafos) e o link da fonte.",
    period: "Período de pesquisa: de {start} a {end} inclusive.",
    json_format: r#"Retorne a resposta ESTRITAMENTE em formato JSON (apenas JSON, sem texto adicional):

{
  "news": [
    {
      "title": {
        "pt": "Título da notícia em português",
        "ru": "Заголовок новости на русском"
      },
      "summary": {
        "pt": "Texto da notícia em português (1-2 parágrafos), escrito diretamente, como jornalista, na terceira pessoa.",
        "ru": "Текст новости на русском языке (1-2 абзаца)."
      },
      "source_url": "https://example.com/news/article"
    }
  ]
}

Se nenhuma notícia for encontrada, retorne: {"news": []}

Retorne APENAS JSON, sem comentários adicionais ou explicações."#,
};

/// Russian sources read dd.mm.yyyy dates, everyone else ISO.
fn format_date(date: NaiveDate, language: &str) -> String {
    if language == "ru" {
        date.format("%d.%m.%Y").to_string()
    } else {
        date.format("%Y-%m-%d").to_string()
    }
}

/// Prompt for one news source. Custom per-source instructions replace the
/// main template but keep the period and format blocks.
pub fn source_prompt(source: &Source, start: NaiveDate, end: NaiveDate) -> String {
    let t = templates(&source.language);
    let start_str = format_date(start, &source.language);
    let end_str = format_date(end, &source.language);

    if let Some(instructions) = source
        .custom_instructions
        .as_deref()
        .filter(|i| !i.trim().is_empty())
    {
        let period = t
            .period
            .replace("{start}", &start_str)
            .replace("{end}", &end_str);
        return format!("{instructions}\n\n{period}\n{}", t.json_format);
    }

    let main = t
        .main
        .replace("{url}", &source.url)
        .replace("{name}", &source.name)
        .replace("{start}", &start_str)
        .replace("{end}", &end_str);
    format!("{main}\n{}", t.json_format)
}

/// Prompt for a manufacturer: industry-wide web search, optionally anchored
/// to the manufacturer's own websites.
pub fn manufacturer_prompt(manufacturer: &Manufacturer, start: NaiveDate, end: NaiveDate) -> String {
    let start_str = format_date(start, "en");
    let end_str = format_date(end, "en");
    let websites: Vec<&str> = manufacturer
        .websites
        .iter()
        .map(|w| w.as_str())
        .filter(|w| !w.trim().is_empty())
        .collect();

    let sites_line = if websites.is_empty() {
        String::new()
    } else {
        format!("\n\nOfficial manufacturer websites: {}", websites.join(", "))
    };

    format!(
        "Find all news about manufacturer {name} for the period from {start_str} to {end_str} \
inclusive.{sites_line}\n\nUse web search to find news. Look for articles, publications and \
press releases about the manufacturer on these websites, industry publications and news portals \
in the specified period. For each found news item, provide the title, the news text \
(1-2 paragraphs) and the source link.\n{format}",
        name = manufacturer.name,
        format = EN.json_format,
    )
}

/// Localized texts for the synthetic "no news found" placeholder post.
pub fn no_news_texts(
    target_name: &str,
    target_url: Option<&str>,
    start: NaiveDate,
    end: NaiveDate,
) -> (LocalizedText, LocalizedText) {
    let period_ru = format!(
        "с {} по {}",
        start.format("%d.%m.%Y"),
        end.format("%d.%m.%Y")
    );
    let period_en = format!("from {start} to {end}");
    let link = match target_url {
        Some(url) => format!("[{target_name}]({url})"),
        None => target_name.to_string(),
    };

    let mut title = LocalizedText::new();
    title.set("ru", format!("Новостей от «{target_name}» не найдено"));
    title.set("en", format!("No news found from '{target_name}'"));
    title.set("de", format!("Keine Nachrichten von '{target_name}' gefunden"));
    title.set("pt", format!("Nenhuma notícia encontrada de '{target_name}'"));

    let mut body = LocalizedText::new();
    body.set(
        "ru",
        format!("За период {period_ru} на ресурсе {link} новостей не обнаружено."),
    );
    body.set(
        "en",
        format!("For the period {period_en}, no news was found on {link}."),
    );
    body.set(
        "de",
        format!("Für den Zeitraum {period_en} wurden auf {link} keine Nachrichten gefunden."),
    );
    body.set(
        "pt",
        format!("No período {period_en}, nenhuma notícia foi encontrada em {link}."),
    );

    (title, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SourceKind;
    use chrono::Utc;

    fn source(language: &str, custom: Option<&str>) -> Source {
        Source {
            id: 1,
            name: "Industry Daily".to_string(),
            url: "https://www.industry-daily.example/news".to_string(),
            language: language.to_string(),
            kind: SourceKind::Automatic,
            custom_instructions: custom.map(|c| c.to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn domain_extraction() {
        assert_eq!(
            extract_domain("https://www.ejarn.com/category/news"),
            Some("ejarn.com".to_string())
        );
        assert_eq!(
            extract_domain("http://example.com/path"),
            Some("example.com".to_string())
        );
        assert_eq!(
            extract_domain("ejarn.com/news"),
            Some("ejarn.com".to_string())
        );
        assert_eq!(extract_domain(""), None);
    }

    #[test]
    fn prompt_uses_source_language_and_dates() {
        let start = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();

        let ru = source_prompt(&source("ru", None), start, end);
        assert!(ru.contains("01.07.2026"));
        assert!(ru.contains("Найди на сайте"));
        assert!(ru.contains("\"news\""));

        let en = source_prompt(&source("en", None), start, end);
        assert!(en.contains("2026-07-01"));
        assert!(en.contains("Find all news"));

        // Unsupported language falls back to English.
        let es = source_prompt(&source("es", None), start, end);
        assert!(es.contains("Find all news"));
    }

    #[test]
    fn custom_instructions_override_main_template() {
        let start = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 2).unwrap();
        let prompt = source_prompt(
            &source("en", Some("Only look at the press-release section.")),
            start,
            end,
        );
        assert!(prompt.starts_with("Only look at the press-release section."));
        assert!(!prompt.contains("Find all news on the website"));
        assert!(prompt.contains("Search period"));
        assert!(prompt.contains("\"news\""));
    }

    #[test]
    fn manufacturer_prompt_lists_websites() {
        let start = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 2).unwrap();
        let m = Manufacturer {
            id: 1,
            name: "Acme Compressors".to_string(),
            websites: vec!["https://acme.example".to_string()],
            created_at: Utc::now(),
        };
        let prompt = manufacturer_prompt(&m, start, end);
        assert!(prompt.contains("Acme Compressors"));
        assert!(prompt.contains("https://acme.example"));

        let bare = Manufacturer {
            websites: vec![],
            ..m
        };
        let prompt = manufacturer_prompt(&bare, start, end);
        assert!(!prompt.contains("Official manufacturer websites"));
    }

    #[test]
    fn no_news_texts_cover_all_languages() {
        let start = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 7, 2).unwrap();
        let (title, body) = no_news_texts("Industry Daily", Some("https://d.example"), start, end);
        for lang in crate::locale::SUPPORTED_LANGUAGES {
            assert!(title.get(lang).is_some(), "missing title for {lang}");
            assert!(body.get(lang).is_some(), "missing body for {lang}");
        }
        assert!(body.get("ru").unwrap().contains("01.07.2026"));
        assert!(body.get("en").unwrap().contains("2026-07-01"));
    }
}
