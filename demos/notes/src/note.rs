//! The note entity.

use omnidm_codec::{CodecResult, FieldDescriptor, LogicalType, Record, Timestamp, Value};
use omnidm_core::{DescriptorBuilder, Entity};
use serde::Serialize;

/// A note.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub body: Option<String>,
    pub tags: Vec<String>,
    pub created: Timestamp,
    pub done: bool,
}

impl Entity for Note {
    fn define(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder
            .collection("notes")
            .field(FieldDescriptor::integer("id").primary_key())
            .field(FieldDescriptor::text("title"))
            .field(FieldDescriptor::text("body").nullable())
            .field(FieldDescriptor::sequence("tags", LogicalType::Text))
            .field(FieldDescriptor::timestamp("created"))
            .field(FieldDescriptor::boolean("done"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("title", &self.title)
            .with("body", self.body.clone())
            .with("tags", Value::sequence(self.tags.iter().cloned()))
            .with("created", self.created)
            .with("done", self.done)
    }

    fn from_record(record: Record) -> CodecResult<Self> {
        Ok(Self {
            id: record.field("id")?,
            title: record.field("title")?,
            body: record.field("body")?,
            tags: record.field("tags")?,
            created: record.field("created")?,
            done: record.field("done")?,
        })
    }
}

/// JSON output form.
#[derive(Debug, Serialize)]
pub struct NoteView<'a> {
    pub id: i64,
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<&'a str>,
    pub tags: &'a [String],
    pub created: Option<String>,
    pub done: bool,
}

impl<'a> From<&'a Note> for NoteView<'a> {
    fn from(note: &'a Note) -> Self {
        Self {
            id: note.id,
            title: &note.title,
            body: note.body.as_deref(),
            tags: &note.tags,
            created: note.created.to_rfc3339(),
            done: note.done,
        }
    }
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = if self.done { "x" } else { " " };
        write!(f, "[{mark}] {:>4}  {}", self.id, self.title)?;
        if !self.tags.is_empty() {
            write!(f, "  #{}", self.tags.join(" #"))?;
        }
        Ok(())
    }
}
