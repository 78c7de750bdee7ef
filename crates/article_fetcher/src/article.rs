use serde::{Deserialize, Serialize};

use crate::Title;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editor {
    pub name: String,
    pub gender: Option<String>,
}

/// One heading-delimited unit of an article. Section 0 is the lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: u32,
    pub toc_level: u32,
    pub level: Option<u32>,
    pub line: String,
    pub anchor: String,
    pub number: String,
    /// Set when the section is transcluded from another page.
    pub from_title: Option<String>,
    pub text: String,
}

impl Section {
    pub fn is_lead(&self) -> bool {
        self.id == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: Title,
    pub display_title: String,
    pub page_id: Option<u64>,
    pub last_modified: Option<String>,
    pub last_modified_by: Option<Editor>,
    pub description: Option<String>,
    /// Target title when the request followed a redirect.
    pub redirected: Option<String>,
    pub language_count: u32,
    pub editable: bool,
    pub protection: Vec<String>,
    pub sections: Vec<Section>,
}

impl Article {
    pub fn lead(&self) -> Option<&Section> {
        self.sections.first().filter(|section| section.is_lead())
    }

    pub fn section_by_anchor(&self, anchor: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.anchor == anchor)
    }
}
