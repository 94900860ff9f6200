//! Deterministic corpus chunk builder.
//!
//! Converts the nested corpus into a flat, ordered sequence of [`Chunk`]s,
//! one per logical fact: the bio, each course, each extracurricular, each
//! work project and event, and each personal project. The output order is
//! fixed (bio, courses, extracurriculars, work, personal projects; within
//! work, workplaces in source key order with projects before events), and
//! identical input always produces a byte-identical sequence — the
//! knowledge base cache and the ranker's tie-break both depend on this.
//!
//! Building never fails: absent scalars render as empty text after their
//! label and absent arrays contribute nothing.

use serde::Serialize;
use std::fmt;

use crate::corpus::Corpus;

/// Separator for display lists (tech stacks, accomplishments, categories).
const LIST_SEPARATOR: &str = ", ";

/// The closed set of chunk types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Bio,
    Course,
    Extracurricular,
    WorkProject,
    WorkEvent,
    PersonalProject,
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChunkKind::Bio => "bio",
            ChunkKind::Course => "course",
            ChunkKind::Extracurricular => "extracurricular",
            ChunkKind::WorkProject => "work_project",
            ChunkKind::WorkEvent => "work_event",
            ChunkKind::PersonalProject => "personal_project",
        };
        f.write_str(s)
    }
}

/// Type tag plus the type-specific optional fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMetadata {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workplace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ChunkMetadata {
    fn new(kind: ChunkKind) -> Self {
        Self {
            kind,
            id: None,
            workplace: None,
            title: None,
        }
    }
}

/// One self-contained unit of retrievable text plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A chunk carrying its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn join(items: &[String]) -> String {
    items.join(LIST_SEPARATOR)
}

/// Build the ordered chunk sequence for a corpus.
pub fn build_chunks(corpus: &Corpus) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    // 1. Bio — one chunk if either a profile or contact section exists.
    if corpus.profile.is_some() || corpus.contact.is_some() {
        let profile = corpus.profile.clone().unwrap_or_default();
        let contact = corpus.contact.clone().unwrap_or_default();
        let links = contact
            .links
            .iter()
            .map(|(label, url)| format!("{}: {}", label, url))
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR);

        let content = format!(
            "Name: {}\nRole: {}\nBio: {}\nEmail: {}\nPhone: {}\nLinks: {}",
            opt(&profile.name),
            opt(&profile.role),
            opt(&profile.bio),
            opt(&contact.email),
            opt(&contact.phone),
            links,
        );
        chunks.push(Chunk {
            content,
            metadata: ChunkMetadata::new(ChunkKind::Bio),
        });
    }

    // 2. Courses, in array order.
    if let Some(academics) = &corpus.academics {
        for course in &academics.courses {
            let year = course.year.map(|y| y.to_string()).unwrap_or_default();
            let content = format!(
                "Course: {}\nTitle: {}\nYear: {}\nDescription: {}\nAccomplishments: {}\nTech stack: {}",
                opt(&course.identifier),
                opt(&course.title),
                year,
                opt(&course.description),
                join(&course.accomplishments),
                join(&course.tech_stack),
            );
            chunks.push(Chunk {
                content,
                metadata: ChunkMetadata {
                    id: course.identifier.clone(),
                    ..ChunkMetadata::new(ChunkKind::Course)
                },
            });
        }

        // 3. Extracurriculars, in array order.
        for entry in &academics.extracurriculars {
            let content = format!(
                "Extracurricular: {}\nDescription: {}\nCategories: {}",
                opt(&entry.title),
                opt(&entry.description),
                join(&entry.categories),
            );
            chunks.push(Chunk {
                content,
                metadata: ChunkMetadata::new(ChunkKind::Extracurricular),
            });
        }
    }

    // 4. Work — workplaces in source key order; projects before events.
    for (workplace, job) in &corpus.work {
        for project in &job.projects {
            let content = format!(
                "Workplace: {}\nProject: {}\nDescription: {}\nTech stack: {}",
                workplace,
                opt(&project.title),
                opt(&project.description),
                join(&project.tech_stack),
            );
            chunks.push(Chunk {
                content,
                metadata: ChunkMetadata {
                    workplace: Some(workplace.clone()),
                    ..ChunkMetadata::new(ChunkKind::WorkProject)
                },
            });
        }
        for event in &job.events {
            let content = format!(
                "Workplace: {}\nEvent: {}\nDescription: {}",
                workplace,
                opt(&event.title),
                opt(&event.description),
            );
            chunks.push(Chunk {
                content,
                metadata: ChunkMetadata {
                    workplace: Some(workplace.clone()),
                    ..ChunkMetadata::new(ChunkKind::WorkEvent)
                },
            });
        }
    }

    // 5. Personal projects, in array order.
    for project in &corpus.projects {
        let content = format!(
            "Project: {}\nDescription: {}\nTech stack: {}\nURL: {}",
            opt(&project.title),
            opt(&project.description),
            join(&project.tech_stack),
            opt(&project.url),
        );
        chunks.push(Chunk {
            content,
            metadata: ChunkMetadata {
                title: project.title.clone(),
                ..ChunkMetadata::new(ChunkKind::PersonalProject)
            },
        });
    }

    chunks
}
