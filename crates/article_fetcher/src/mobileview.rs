//! Request construction and decoding for the `action=mobileview` API.

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::{Article, Editor, FailureKind, FetchError, Section, Title};

const PAGE_PROPS: &str =
    "sections|text|lastmodified|lastmodifiedby|languagecount|id|protection|editable|displaytitle|description";
const SECTION_PROPS: &str = "toclevel|line|anchor|level|number|fromtitle|index";

/// URL requesting every section of `title`, following redirects.
pub fn sections_request_url(title: &Title) -> Url {
    let mut url = title.site().api_url().clone();
    url.query_pairs_mut()
        .append_pair("action", "mobileview")
        .append_pair("format", "json")
        .append_pair("page", &title.db_key())
        .append_pair("sections", "all")
        .append_pair("prop", PAGE_PROPS)
        .append_pair("sectionprop", SECTION_PROPS)
        .append_pair("noheadings", "true")
        .append_pair("redirect", "yes");
    url
}

#[derive(Debug, Deserialize)]
struct Envelope {
    mobileview: Option<MobileView>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct MobileView {
    id: Option<u64>,
    displaytitle: Option<String>,
    lastmodified: Option<String>,
    lastmodifiedby: Option<RawEditor>,
    description: Option<String>,
    redirected: Option<String>,
    #[serde(default)]
    languagecount: u32,
    #[serde(default)]
    editable: bool,
    #[serde(default)]
    protection: Value,
    sections: Vec<RawSection>,
}

#[derive(Debug, Deserialize)]
struct RawEditor {
    name: String,
    gender: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    id: u32,
    #[serde(default)]
    toclevel: u32,
    // The API encodes `level` and `number` as strings.
    level: Option<Value>,
    #[serde(default)]
    line: String,
    #[serde(default)]
    anchor: String,
    number: Option<Value>,
    fromtitle: Option<String>,
    #[serde(default)]
    text: String,
}

/// Decode a mobileview payload into an [`Article`] for `title`.
pub fn decode_sections(title: &Title, payload: &[u8]) -> Result<Article, FetchError> {
    let envelope: Envelope = serde_json::from_slice(payload)
        .map_err(|err| FetchError::new(FailureKind::Malformed, err.to_string()))?;

    if let Some(error) = envelope.error {
        let kind = if error.code == "missingtitle" {
            FailureKind::MissingTitle
        } else {
            FailureKind::Api { code: error.code }
        };
        return Err(FetchError::new(kind, error.info));
    }

    let view = envelope.mobileview.ok_or_else(|| {
        FetchError::new(FailureKind::Malformed, "payload has neither mobileview nor error")
    })?;

    let sections = view
        .sections
        .into_iter()
        .map(|raw| Section {
            id: raw.id,
            toc_level: raw.toclevel,
            level: raw.level.as_ref().and_then(lenient_u32),
            line: raw.line,
            anchor: raw.anchor,
            number: raw.number.as_ref().map(lenient_string).unwrap_or_default(),
            from_title: raw.fromtitle,
            text: raw.text,
        })
        .collect();

    Ok(Article {
        title: title.clone(),
        display_title: view
            .displaytitle
            .unwrap_or_else(|| title.text().to_string()),
        page_id: view.id,
        last_modified: view.lastmodified,
        last_modified_by: view.lastmodifiedby.map(|editor| Editor {
            name: editor.name,
            gender: editor.gender,
        }),
        description: view.description,
        redirected: view.redirected,
        language_count: view.languagecount,
        editable: view.editable,
        protection: flatten_protection(&view.protection),
        sections,
    })
}

fn lenient_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// `[]` when unprotected, otherwise `{"edit": ["sysop"], ...}`.
fn flatten_protection(value: &Value) -> Vec<String> {
    let Value::Object(map) = value else {
        return Vec::new();
    };
    let mut entries: Vec<String> = map
        .iter()
        .flat_map(|(action, groups)| {
            let groups = groups.as_array().cloned().unwrap_or_default();
            groups
                .into_iter()
                .filter_map(|group| group.as_str().map(|g| format!("{action}={g}")))
                .collect::<Vec<_>>()
        })
        .collect();
    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Site;
    use pretty_assertions::assert_eq;

    fn title() -> Title {
        Title::new(Site::wikipedia("en").unwrap(), "Golden Gate Bridge").unwrap()
    }

    #[test]
    fn request_url_carries_db_key_and_props() {
        let url = sections_request_url(&title());
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("action".into(), "mobileview".into())));
        assert!(pairs.contains(&("page".into(), "Golden_Gate_Bridge".into())));
        assert!(pairs.contains(&("sections".into(), "all".into())));
        assert!(url.as_str().starts_with("https://en.m.wikipedia.org/w/api.php?"));
    }

    #[test]
    fn decodes_sections_with_string_levels() {
        let payload = br#"{
            "mobileview": {
                "id": 11920,
                "displaytitle": "Golden Gate Bridge",
                "lastmodified": "2015-08-11T10:00:00Z",
                "lastmodifiedby": {"name": "Someone", "gender": "unknown"},
                "languagecount": 96,
                "editable": true,
                "protection": {"move": ["sysop"], "edit": ["autoconfirmed"]},
                "sections": [
                    {"id": 0, "text": "<p>Lead</p>"},
                    {"id": 1, "toclevel": 1, "level": "2", "line": "History",
                     "anchor": "History", "number": "1", "index": "1", "text": "<p>Built</p>"}
                ]
            }
        }"#;

        let article = decode_sections(&title(), payload).unwrap();
        assert_eq!(article.page_id, Some(11920));
        assert_eq!(article.language_count, 96);
        assert_eq!(
            article.protection,
            vec!["edit=autoconfirmed".to_string(), "move=sysop".to_string()]
        );
        assert_eq!(article.sections.len(), 2);
        assert!(article.lead().is_some());
        let history = article.section_by_anchor("History").unwrap();
        assert_eq!(history.level, Some(2));
        assert_eq!(history.number, "1");
        assert_eq!(history.toc_level, 1);
    }

    #[test]
    fn empty_protection_array_is_empty() {
        let payload = br#"{"mobileview": {"protection": [], "sections": []}}"#;
        let article = decode_sections(&title(), payload).unwrap();
        assert!(article.protection.is_empty());
        assert_eq!(article.display_title, "Golden Gate Bridge");
    }

    #[test]
    fn maps_api_errors() {
        let missing = br#"{"error": {"code": "missingtitle", "info": "The page you specified doesn't exist"}}"#;
        let err = decode_sections(&title(), missing).unwrap_err();
        assert_eq!(err.kind, FailureKind::MissingTitle);

        let other = br#"{"error": {"code": "ratelimited"}}"#;
        let err = decode_sections(&title(), other).unwrap_err();
        assert_eq!(
            err.kind,
            FailureKind::Api {
                code: "ratelimited".into()
            }
        );
    }

    #[test]
    fn rejects_garbage() {
        let err = decode_sections(&title(), b"<html>oops</html>").unwrap_err();
        assert_eq!(err.kind, FailureKind::Malformed);

        let err = decode_sections(&title(), br#"{"batchcomplete": true}"#).unwrap_err();
        assert_eq!(err.kind, FailureKind::Malformed);
    }
}
