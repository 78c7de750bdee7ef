use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TitleError {
    #[error("title is empty")]
    Empty,
    #[error("title contains illegal character {0:?}")]
    IllegalCharacter(char),
    #[error("invalid language code {0:?}")]
    InvalidLanguage(String),
    #[error("invalid api url: {0}")]
    InvalidApiUrl(String),
}

/// The wiki a title lives on, identified by its API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Site {
    api_url: Url,
    language: Option<String>,
}

impl Site {
    /// Mobile API endpoint of the Wikipedia edition for `language`.
    pub fn wikipedia(language: &str) -> Result<Self, TitleError> {
        let language = language.trim().to_ascii_lowercase();
        let valid = !language.is_empty()
            && language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(TitleError::InvalidLanguage(language));
        }
        let api_url = Url::parse(&format!("https://{language}.m.wikipedia.org/w/api.php"))
            .map_err(|err| TitleError::InvalidApiUrl(err.to_string()))?;
        Ok(Self {
            api_url,
            language: Some(language),
        })
    }

    /// Any MediaWiki API endpoint, e.g. a mirror or a local test server.
    pub fn from_api_url(api_url: &str) -> Result<Self, TitleError> {
        let api_url =
            Url::parse(api_url).map_err(|err| TitleError::InvalidApiUrl(err.to_string()))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(TitleError::InvalidApiUrl(format!(
                "unsupported scheme {}",
                api_url.scheme()
            )));
        }
        Ok(Self {
            api_url,
            language: None,
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

/// Identifies one article on a [`Site`].
///
/// The text is kept in display form: trimmed, underscores replaced by spaces
/// and the first letter upper-cased. An optional `#fragment` is split off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Title {
    site: Site,
    text: String,
    fragment: Option<String>,
}

impl Title {
    pub fn new(site: Site, raw: &str) -> Result<Self, TitleError> {
        let (text, fragment) = match raw.split_once('#') {
            Some((text, fragment)) => {
                let fragment = fragment.trim();
                (text, (!fragment.is_empty()).then(|| fragment.to_string()))
            }
            None => (raw, None),
        };
        let text = normalize(text)?;
        Ok(Self {
            site,
            text,
            fragment,
        })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Underscore form used in API requests and file names.
    pub fn db_key(&self) -> String {
        self.text.replace(' ', "_")
    }

    /// Identity of the page, ignoring the fragment.
    pub(crate) fn page_key(&self) -> String {
        format!("{}|{}", self.site.api_url, self.db_key())
    }

    /// Same page on the same endpoint, whatever the fragments.
    pub(crate) fn same_page(&self, other: &Title) -> bool {
        self.site.api_url == other.site.api_url && self.text == other.text
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "{}#{}", self.text, fragment),
            None => write!(f, "{}", self.text),
        }
    }
}

fn normalize(raw: &str) -> Result<String, TitleError> {
    const ILLEGAL: &[char] = &['<', '>', '[', ']', '{', '}', '|'];

    let spaced = raw.replace('_', " ");
    // Collapse runs of whitespace into single spaces.
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(TitleError::Empty);
    }
    if let Some(c) = collapsed.chars().find(|c| ILLEGAL.contains(c) || c.is_control()) {
        return Err(TitleError::IllegalCharacter(c));
    }

    let mut chars = collapsed.chars();
    let mut normalized = String::with_capacity(collapsed.len());
    if let Some(first) = chars.next() {
        normalized.extend(first.to_uppercase());
    }
    normalized.extend(chars);
    Ok(normalized)
}
