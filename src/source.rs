//! Discovery against an arXiv-style Atom query API.
//!
//! One HTTP round-trip returns a feed of candidate papers; entries are parsed
//! with an event reader and de-duplicated so that only the highest observed
//! version of each paper survives into the worklist.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::PipelineError;
use crate::models::PaperMeta;

pub struct SourceClient {
    client: reqwest::Client,
    endpoint: String,
    source_type: String,
    default_license: Option<String>,
}

impl SourceClient {
    pub fn new(config: &SourceConfig, timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::TransientNetwork(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            source_type: config.source_type.clone(),
            default_license: config.default_license.clone(),
        })
    }

    /// Query the source and return de-duplicated paper metadata.
    pub async fn discover(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<PaperMeta>, PipelineError> {
        let url = format!(
            "{}?search_query={}&start=0&max_results={}",
            self.endpoint,
            encode_query(query),
            max_results
        );

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::TransientNetwork(format!(
                "source query returned HTTP {status}"
            )));
        }

        let body = resp.text().await?;
        let papers = parse_atom_feed(&body, &self.source_type, self.default_license.as_deref())?;
        let deduped = dedup_latest(papers);
        debug!(count = deduped.len(), "source discovery complete");
        Ok(deduped)
    }
}

/// Minimal query encoding for the Atom API: spaces become `+`, reserved
/// characters are percent-encoded. Colons are left intact — field prefixes
/// like `cat:cs.CL` rely on them.
fn encode_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for ch in query.chars() {
        match ch {
            ' ' => out.push('+'),
            '"' => out.push_str("%22"),
            '&' => out.push_str("%26"),
            '#' => out.push_str("%23"),
            _ => out.push(ch),
        }
    }
    out
}

/// Split a raw Atom entry ID like `http://arxiv.org/abs/2101.00001v2` into
/// the bare paper number and its version tag. Old-style IDs with a category
/// prefix (`cond-mat/0001001v1`) keep the prefix in the paper number.
pub fn split_source_id(raw: &str) -> (String, String) {
    let tail = match raw.find("/abs/") {
        Some(pos) => &raw[pos + 5..],
        None => raw,
    };

    if let Some(vpos) = tail.rfind('v') {
        let (id, ver) = tail.split_at(vpos);
        if !id.is_empty() && ver.len() > 1 && ver[1..].chars().all(|c| c.is_ascii_digit()) {
            return (id.to_string(), ver.to_string());
        }
    }
    (tail.to_string(), String::new())
}

fn version_ordinal(version: &str) -> u32 {
    version
        .strip_prefix('v')
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Keep the highest version per `source_id`, preserving first-seen order.
fn dedup_latest(papers: Vec<PaperMeta>) -> Vec<PaperMeta> {
    let mut best: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<PaperMeta> = Vec::with_capacity(papers.len());

    for paper in papers {
        match best.get(&paper.source_id) {
            Some(&idx) => {
                if version_ordinal(&paper.version) > version_ordinal(&out[idx].version) {
                    out[idx] = paper;
                }
            }
            None => {
                best.insert(paper.source_id.clone(), out.len());
                out.push(paper);
            }
        }
    }
    out
}

/// Parse an Atom feed into paper metadata. Malformed XML is a
/// `ValidationFailed` — the feed is the source's contract, not ours to guess.
pub fn parse_atom_feed(
    xml: &str,
    source_type: &str,
    default_license: Option<&str>,
) -> Result<Vec<PaperMeta>, PipelineError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    #[derive(Default)]
    struct EntryDraft {
        raw_id: String,
        title: String,
        pdf_url: Option<String>,
        authors: Vec<String>,
    }

    let mut papers = Vec::new();
    let mut draft: Option<EntryDraft> = None;
    let mut in_author = false;
    let mut text_field: Option<&'static str> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| PipelineError::ValidationFailed(format!("feed parse error: {e}")))?;

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => draft = Some(EntryDraft::default()),
                b"author" if draft.is_some() => in_author = true,
                b"id" if draft.is_some() && !in_author => text_field = Some("id"),
                b"title" if draft.is_some() => text_field = Some("title"),
                b"name" if in_author => text_field = Some("name"),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"link" => {
                if let Some(d) = draft.as_mut() {
                    let mut href = None;
                    let mut is_pdf = false;
                    for attr in e.attributes().flatten() {
                        let value = String::from_utf8_lossy(&attr.value).into_owned();
                        match attr.key.as_ref() {
                            b"href" => href = Some(value),
                            b"title" if value == "pdf" => is_pdf = true,
                            b"type" if value == "application/pdf" => is_pdf = true,
                            _ => {}
                        }
                    }
                    if is_pdf {
                        if let Some(href) = href {
                            d.pdf_url = Some(href);
                        }
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(d), Some(field)) = (draft.as_mut(), text_field) {
                    let text = t
                        .unescape()
                        .map_err(|e| {
                            PipelineError::ValidationFailed(format!("feed parse error: {e}"))
                        })?
                        .into_owned();
                    match field {
                        "id" => d.raw_id.push_str(&text),
                        "title" => d.title.push_str(&text),
                        "name" => d.authors.push(collapse_whitespace(&text)),
                        _ => {}
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"author" => in_author = false,
                b"id" | b"title" | b"name" => text_field = None,
                b"entry" => {
                    if let Some(d) = draft.take() {
                        let (source_id, version) = split_source_id(&d.raw_id);
                        if source_id.is_empty() {
                            continue;
                        }
                        let pdf_url = match d.pdf_url {
                            Some(url) => url,
                            // No PDF link in the entry; nothing to acquire.
                            None => continue,
                        };
                        papers.push(PaperMeta {
                            source_type: source_type.to_string(),
                            source_id,
                            version,
                            title: collapse_whitespace(&d.title),
                            pdf_url,
                            license: default_license.map(str::to_string),
                            authors: d.authors,
                        });
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(papers)
}

/// Atom titles wrap with embedded newlines and double spaces; normalize to
/// single spaces.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query Results</title>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v2</id>
    <title>Attention Is Not
  All You Need</title>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2101.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2101.00001v2" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2101.00002v1</id>
    <title>Sparse Retrieval Revisited</title>
    <author><name>Grace Hopper</name></author>
    <link title="pdf" href="http://arxiv.org/pdf/2101.00002v1" rel="related" type="application/pdf"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries_with_versions_and_authors() {
        let papers = parse_atom_feed(FEED, "arxiv", Some("arXiv.org license")).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.source_id, "2101.00001");
        assert_eq!(first.version, "v2");
        assert_eq!(first.title, "Attention Is Not All You Need");
        assert_eq!(first.pdf_url, "http://arxiv.org/pdf/2101.00001v2");
        assert_eq!(first.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(first.license.as_deref(), Some("arXiv.org license"));
    }

    #[test]
    fn entries_without_pdf_links_are_skipped() {
        let feed = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/2101.00003v1</id>
    <title>No PDF Here</title>
  </entry>
</feed>"#;
        let papers = parse_atom_feed(feed, "arxiv", None).unwrap();
        assert!(papers.is_empty());
    }

    #[test]
    fn splits_modern_and_legacy_ids() {
        assert_eq!(
            split_source_id("http://arxiv.org/abs/2101.00001v2"),
            ("2101.00001".to_string(), "v2".to_string())
        );
        assert_eq!(
            split_source_id("http://arxiv.org/abs/cond-mat/0001001v1"),
            ("cond-mat/0001001".to_string(), "v1".to_string())
        );
        assert_eq!(
            split_source_id("2101.00001"),
            ("2101.00001".to_string(), String::new())
        );
    }

    #[test]
    fn dedup_keeps_highest_version() {
        let mk = |id: &str, ver: &str| PaperMeta {
            source_type: "arxiv".into(),
            source_id: id.into(),
            version: ver.into(),
            title: format!("{id} {ver}"),
            pdf_url: "http://example.org/p.pdf".into(),
            license: None,
            authors: vec![],
        };
        let deduped = dedup_latest(vec![mk("a", "v1"), mk("b", "v1"), mk("a", "v3"), mk("a", "v2")]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].source_id, "a");
        assert_eq!(deduped[0].version, "v3");
        assert_eq!(deduped[1].source_id, "b");
    }

    #[test]
    fn malformed_xml_is_a_validation_failure() {
        let result = parse_atom_feed("<feed><entry></feed>", "arxiv", None);
        assert!(matches!(result, Err(PipelineError::ValidationFailed(_))));
    }

    #[test]
    fn query_encoding_preserves_field_prefixes() {
        assert_eq!(encode_query("cat:cs.CL"), "cat:cs.CL");
        assert_eq!(encode_query("all:\"graph neural\""), "all:%22graph+neural%22");
    }
}
