//! Atom bulletin reader.
//!
//! Walks the document with a streaming XML reader and collects the named
//! fields of each `<entry>`. Namespace prefixes are ignored, so
//! `<georss:point>` is read as `point`. Malformed documents (mismatched or
//! unterminated tags) are an error rather than a partial result.
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::SourceError;
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulletinEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub updated: Option<String>,
    pub summary: Option<String>,
    pub point: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Updated,
    Summary,
    Point,
}

impl Field {
    fn from_tag(local_name: &[u8]) -> Option<Self> {
        match local_name {
            b"id" => Some(Field::Id),
            b"title" => Some(Field::Title),
            b"updated" => Some(Field::Updated),
            b"summary" => Some(Field::Summary),
            b"point" => Some(Field::Point),
            _ => None,
        }
    }
}

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    updated: String,
    summary: String,
    point: String,
}

impl EntryBuilder {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Id => &mut self.id,
            Field::Title => &mut self.title,
            Field::Updated => &mut self.updated,
            Field::Summary => &mut self.summary,
            Field::Point => &mut self.point,
        };
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(text.trim());
    }

    fn build(self) -> BulletinEntry {
        fn non_empty(s: String) -> Option<String> {
            let s = s.trim().to_string();
            (!s.is_empty()).then_some(s)
        }
        BulletinEntry {
            point: parse_point(&self.point),
            id: non_empty(self.id),
            title: non_empty(self.title),
            updated: non_empty(self.updated),
            summary: non_empty(self.summary),
        }
    }
}

/// GeoRSS simple point: `"<lat> <lon>"`.
pub fn parse_point(raw: &str) -> Option<GeoPoint> {
    let mut parts = raw.split_whitespace();
    let lat = parts.next()?.parse::<f64>().ok()?;
    let lon = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some(GeoPoint::new(lat, lon))
}

pub fn parse_entries(xml: &str) -> Result<Vec<BulletinEntry>, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                if name.as_ref() == b"entry" {
                    if current.is_some() {
                        return Err(SourceError::Bulletin("nested <entry> element".to_string()));
                    }
                    current = Some(EntryBuilder::default());
                    field = None;
                } else if current.is_some() {
                    if let Some(f) = Field::from_tag(name.as_ref()) {
                        field = Some(f);
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape()?;
                    entry.push(f, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let bytes = c.into_inner();
                    entry.push(f, &String::from_utf8_lossy(&bytes));
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == b"entry" {
                    if let Some(entry) = current.take() {
                        entries.push(entry.build());
                    }
                    field = None;
                } else if field.is_some() && Field::from_tag(name.as_ref()) == field {
                    field = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if current.is_some() {
        return Err(SourceError::Bulletin("unterminated <entry> element".to_string()));
    }
    Ok(entries)
}
