//! Corpus data model and loading.
//!
//! The corpus is a single nested JSON document describing a person: profile
//! and contact details, academic history, work history, and personal
//! projects. Every field is optional — the chunk builder renders absent
//! scalars as empty text and treats absent arrays as empty lists, so a
//! sparse corpus is never an error.
//!
//! The `work` section is a JSON object mapping workplace keys to job
//! records. Its key order is load-bearing (it determines chunk order), so
//! it is deserialized into an explicit ordered `Vec<(String, Job)>` rather
//! than a hash map.

use anyhow::{Context, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

/// The full personal data corpus. All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub contact: Option<Contact>,
    #[serde(default)]
    pub academics: Option<Academics>,
    /// Workplace key → job record, in source definition order.
    #[serde(default, deserialize_with = "ordered_entries")]
    pub work: Vec<(String, Job)>,
    /// Personal projects.
    #[serde(default)]
    pub projects: Vec<PersonalProject>,
    /// Free-text instructions appended verbatim to every assembled prompt.
    #[serde(default)]
    pub system_instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Link label → URL, in source definition order.
    #[serde(default, deserialize_with = "ordered_entries")]
    pub links: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Academics {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub extracurriculars: Vec<Extracurricular>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub accomplishments: Vec<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Extracurricular {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// One workplace's record: projects first, then events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub projects: Vec<WorkProject>,
    #[serde(default)]
    pub events: Vec<WorkEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkProject {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkEvent {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalProject {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Load and parse the corpus JSON file.
pub fn load_corpus(path: &Path) -> Result<Corpus> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
    let corpus: Corpus =
        serde_json::from_str(&content).with_context(|| "Failed to parse corpus file")?;
    Ok(corpus)
}

/// Deserialize a JSON object into key/value pairs, preserving source order.
fn ordered_entries<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct EntriesVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a JSON object")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, T>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_corpus_parses() {
        let corpus: Corpus = serde_json::from_str("{}").unwrap();
        assert!(corpus.profile.is_none());
        assert!(corpus.work.is_empty());
        assert!(corpus.projects.is_empty());
    }

    #[test]
    fn test_work_preserves_key_order() {
        let json = r#"{
            "work": {
                "zeta_corp": { "projects": [] },
                "alpha_inc": { "events": [] },
                "mid_labs": {}
            }
        }"#;
        let corpus: Corpus = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = corpus.work.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta_corp", "alpha_inc", "mid_labs"]);
    }

    #[test]
    fn test_links_preserve_order() {
        let json = r#"{
            "contact": {
                "links": { "github": "https://g", "blog": "https://b", "linkedin": "https://l" }
            }
        }"#;
        let corpus: Corpus = serde_json::from_str(json).unwrap();
        let contact = corpus.contact.unwrap();
        let labels: Vec<&str> = contact.links.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(labels, vec!["github", "blog", "linkedin"]);
    }

    #[test]
    fn test_partial_records_fill_defaults() {
        let json = r#"{
            "academics": { "courses": [{ "identifier": "CS101" }] },
            "projects": [{ "title": "folio" }]
        }"#;
        let corpus: Corpus = serde_json::from_str(json).unwrap();
        let course = &corpus.academics.unwrap().courses[0];
        assert_eq!(course.identifier.as_deref(), Some("CS101"));
        assert!(course.title.is_none());
        assert!(course.accomplishments.is_empty());
        assert_eq!(corpus.projects[0].title.as_deref(), Some("folio"));
    }
}
