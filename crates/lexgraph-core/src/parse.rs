//! Structural parsing of raw legal documents.
//!
//! Two input shapes are accepted:
//!
//! - **JSON** objects carrying `title`, `jurisdiction`, and `authorityLevel`
//!   plus optional `citation`, `effectiveFrom`, `effectiveTo`, body text
//!   (`text`, `rawText`, or `content`), pre-split `sections`, and `amends`.
//! - **Plain text**, classified by the corpus [`SourceProfile`] it was
//!   submitted under. The first non-empty line becomes the title.
//!
//! Parsing is pure: no store is touched, so the orchestrator can run it
//! before deciding whether a unit is a duplicate.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::error::IngestError;
use crate::models::{AuthorityLevel, Jurisdiction};

/// Maximum title length taken from the first line of a text document.
pub const MAX_TEXT_TITLE_CHARS: usize = 200;

/// Known corpus source and the classification it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceProfile {
    pub name: &'static str,
    pub jurisdiction: Jurisdiction,
    pub authority_level: AuthorityLevel,
    pub description: &'static str,
}

pub const SOURCE_PROFILES: &[SourceProfile] = &[
    SourceProfile {
        name: "us-code",
        jurisdiction: Jurisdiction::Federal,
        authority_level: AuthorityLevel::Statute,
        description: "United States Code",
    },
    SourceProfile {
        name: "ecfr",
        jurisdiction: Jurisdiction::Federal,
        authority_level: AuthorityLevel::Regulation,
        description: "Electronic Code of Federal Regulations",
    },
    SourceProfile {
        name: "texas-statutes",
        jurisdiction: Jurisdiction::State,
        authority_level: AuthorityLevel::Statute,
        description: "Texas Statutes",
    },
    SourceProfile {
        name: "austin-ordinances",
        jurisdiction: Jurisdiction::Municipal,
        authority_level: AuthorityLevel::Ordinance,
        description: "Austin City Code",
    },
];

impl SourceProfile {
    pub fn lookup(name: &str) -> Option<&'static SourceProfile> {
        SOURCE_PROFILES.iter().find(|p| p.name == name)
    }
}

/// One pre-split section of a document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SectionInput {
    pub citation: String,
    pub heading: String,
    pub text: String,
}

/// Result of parsing one ingestion unit.
///
/// `sections` is never empty: a document without pre-split sections is
/// treated as one section spanning the whole text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub title: String,
    pub citation: String,
    pub jurisdiction: Jurisdiction,
    pub authority_level: AuthorityLevel,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub text: String,
    pub sections: Vec<SectionInput>,
    /// Title of a document this one amends.
    pub amends: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    title: Option<String>,
    jurisdiction: Option<String>,
    authority_level: Option<String>,
    citation: Option<String>,
    effective_from: Option<String>,
    effective_to: Option<String>,
    text: Option<String>,
    raw_text: Option<String>,
    content: Option<String>,
    #[serde(default)]
    sections: Vec<SectionInput>,
    amends: Option<String>,
}

/// Parse a document, defaulting missing effective dates to today (UTC).
pub fn parse_document(
    content: &str,
    source: &str,
    filename: &str,
) -> Result<ParsedDocument, IngestError> {
    parse_document_on(content, source, filename, Utc::now().date_naive())
}

/// Parse a document with an explicit date for missing `effectiveFrom`.
pub fn parse_document_on(
    content: &str,
    source: &str,
    filename: &str,
    today: NaiveDate,
) -> Result<ParsedDocument, IngestError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| IngestError::Parse(format!("{}: invalid JSON: {}", filename, e)))?;
        return parse_json(value, content, filename, today);
    }
    parse_text(content, source, filename, today)
}

fn parse_json(
    value: serde_json::Value,
    content: &str,
    filename: &str,
    today: NaiveDate,
) -> Result<ParsedDocument, IngestError> {
    let raw: RawDocument = serde_json::from_value(value)
        .map_err(|e| IngestError::Parse(format!("{}: {}", filename, e)))?;

    let title = required(raw.title, "title", filename)?;
    let jurisdiction: Jurisdiction = required(raw.jurisdiction, "jurisdiction", filename)?
        .parse()
        .map_err(|e| IngestError::Parse(format!("{}: {}", filename, e)))?;
    let authority_level: AuthorityLevel =
        required(raw.authority_level, "authorityLevel", filename)?
            .parse()
            .map_err(|e| IngestError::Parse(format!("{}: {}", filename, e)))?;

    let effective_from = match raw.effective_from {
        Some(s) => parse_date(&s, "effectiveFrom", filename)?,
        None => today,
    };
    let effective_to = raw
        .effective_to
        .map(|s| parse_date(&s, "effectiveTo", filename))
        .transpose()?;
    if let Some(to) = effective_to {
        if to < effective_from {
            return Err(IngestError::Parse(format!(
                "{}: effectiveTo {} precedes effectiveFrom {}",
                filename, to, effective_from
            )));
        }
    }

    let citation = raw
        .citation
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| file_stem(filename).to_string());
    let text = raw
        .text
        .or(raw.raw_text)
        .or(raw.content)
        .unwrap_or_else(|| content.to_string());

    let sections = if raw.sections.is_empty() {
        vec![whole_document_section(&citation, &title, &text)]
    } else {
        raw.sections
    };

    Ok(ParsedDocument {
        title,
        citation,
        jurisdiction,
        authority_level,
        effective_from,
        effective_to,
        text,
        sections,
        amends: raw.amends.filter(|a| !a.trim().is_empty()),
    })
}

fn parse_text(
    content: &str,
    source: &str,
    filename: &str,
    today: NaiveDate,
) -> Result<ParsedDocument, IngestError> {
    let profile = SourceProfile::lookup(source).ok_or_else(|| {
        IngestError::Parse(format!(
            "{}: unknown source '{}' and no JSON metadata",
            filename, source
        ))
    })?;

    let stem = file_stem(filename).to_string();
    let title = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(MAX_TEXT_TITLE_CHARS).collect::<String>())
        .unwrap_or_else(|| stem.clone());

    let sections = vec![whole_document_section(&stem, &title, content)];
    Ok(ParsedDocument {
        title,
        citation: stem,
        jurisdiction: profile.jurisdiction,
        authority_level: profile.authority_level,
        effective_from: today,
        effective_to: None,
        text: content.to_string(),
        sections,
        amends: None,
    })
}

fn whole_document_section(citation: &str, title: &str, text: &str) -> SectionInput {
    SectionInput {
        citation: citation.to_string(),
        heading: title.to_string(),
        text: text.to_string(),
    }
}

fn required(value: Option<String>, field: &str, filename: &str) -> Result<String, IngestError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(IngestError::Parse(format!(
            "{}: missing required field '{}'",
            filename, field
        ))),
    }
}

fn parse_date(value: &str, field: &str, filename: &str) -> Result<NaiveDate, IngestError> {
    // Accept full timestamps by taking the date prefix.
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| {
        IngestError::Parse(format!(
            "{}: invalid {} '{}' (expected YYYY-MM-DD)",
            filename, field, value
        ))
    })
}

/// File name without its final extension.
pub fn file_stem(filename: &str) -> &str {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_json_with_sections() {
        let json = r#"{
            "title": "Texas Property Code",
            "citation": "Tex. Prop. Code",
            "jurisdiction": "state",
            "authorityLevel": "statute",
            "effectiveFrom": "2023-09-01",
            "sections": [
                {"citation": "§ 5.003", "heading": "Owner Occupancy", "text": "No owner-occupancy requirement."},
                {"citation": "§ 5.004", "heading": "Notice", "text": "Notice must be given."}
            ]
        }"#;
        let doc = parse_document_on(json, "texas-statutes", "prop.json", day()).unwrap();
        assert_eq!(doc.title, "Texas Property Code");
        assert_eq!(doc.jurisdiction, Jurisdiction::State);
        assert_eq!(doc.authority_level, AuthorityLevel::Statute);
        assert_eq!(doc.effective_from.to_string(), "2023-09-01");
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].citation, "§ 5.003");
        assert!(doc.amends.is_none());
    }

    #[test]
    fn test_json_without_sections_is_one_section() {
        let json = r#"{"title": "US Constitution", "jurisdiction": "federal",
            "authorityLevel": "constitution", "rawText": "We the People."}"#;
        let doc = parse_document_on(json, "us-code", "const.json", day()).unwrap();
        assert_eq!(doc.citation, "const");
        assert_eq!(doc.effective_from, day());
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].heading, "US Constitution");
        assert_eq!(doc.sections[0].text, "We the People.");
    }

    #[test]
    fn test_json_missing_required_field() {
        let json = r#"{"title": "Orphan", "jurisdiction": "state"}"#;
        let err = parse_document_on(json, "texas-statutes", "o.json", day()).unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
        assert!(err.to_string().contains("authorityLevel"));
    }

    #[test]
    fn test_json_unknown_jurisdiction() {
        let json = r#"{"title": "X", "jurisdiction": "county", "authorityLevel": "ordinance"}"#;
        let err = parse_document_on(json, "austin-ordinances", "x.json", day()).unwrap_err();
        assert!(err.to_string().contains("unknown jurisdiction: 'county'"));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_document_on("{ not json", "us-code", "bad.json", day()).unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
    }

    #[test]
    fn test_bad_date_range() {
        let json = r#"{"title": "X", "jurisdiction": "state", "authorityLevel": "statute",
            "effectiveFrom": "2024-01-01", "effectiveTo": "2023-01-01"}"#;
        assert!(parse_document_on(json, "texas-statutes", "x.json", day()).is_err());
    }

    #[test]
    fn test_text_fallback_uses_profile() {
        let text = "\n\n  Austin Short-Term Rental Ordinance  \nSec. 25-2-788. Licensing.\n";
        let doc = parse_document_on(text, "austin-ordinances", "str-rules.txt", day()).unwrap();
        assert_eq!(doc.title, "Austin Short-Term Rental Ordinance");
        assert_eq!(doc.citation, "str-rules");
        assert_eq!(doc.jurisdiction, Jurisdiction::Municipal);
        assert_eq!(doc.authority_level, AuthorityLevel::Ordinance);
        assert_eq!(doc.sections.len(), 1);
    }

    #[test]
    fn test_text_title_truncated() {
        let text = "x".repeat(500);
        let doc = parse_document_on(&text, "ecfr", "long.txt", day()).unwrap();
        assert_eq!(doc.title.chars().count(), MAX_TEXT_TITLE_CHARS);
    }

    #[test]
    fn test_text_unknown_source() {
        let err = parse_document_on("Some text", "county-code", "a.txt", day()).unwrap_err();
        assert!(err.to_string().contains("unknown source 'county-code'"));
    }

    #[test]
    fn test_amends_field() {
        let json = r#"{"title": "STR Amendment 2024", "jurisdiction": "municipal",
            "authorityLevel": "ordinance", "text": "Amends.", "amends": "Austin STR Ordinance"}"#;
        let doc = parse_document_on(json, "austin-ordinances", "a.json", day()).unwrap();
        assert_eq!(doc.amends.as_deref(), Some("Austin STR Ordinance"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("dir/sub/tx-prop.json"), "tx-prop");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(file_stem("plain"), "plain");
    }
}
