//! Prompt-ready context blocks and the UI citation list built from them.
//!
//! Block `N` in the context always carries marker `[N]` and corresponds to
//! the citation with id `source-N`.

use serde::{Deserialize, Serialize};

use crate::retrieval::RetrievalResult;

/// Header of the plain context block.
pub const CONTEXT_HEADER: &str = "TRUSTED MEDICAL SOURCES:";
/// Separator placed between source blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";
/// Characters kept in a citation excerpt.
pub const EXCERPT_CHARS: usize = 150;

/// UI-facing projection of a retrieval result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// `source-N`, matching marker `[N]`.
    pub id: String,
    /// De-slugified source name.
    pub source_title: String,
    /// Leading characters of the chunk text.
    pub excerpt: String,
    /// Similarity as a whole percentage.
    pub similarity: u8,
}

/// Context string plus its parallel citation list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagContext {
    /// Grounding text for the downstream prompt.
    pub context: String,
    /// One entry per source block, in block order.
    pub citations: Vec<Citation>,
}

impl RagContext {
    /// True when nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

/// Turns a source key into a display name.
///
/// `cystic-fibrosis_guide_2` becomes `cystic fibrosis guide`.
pub fn format_source_name(source: &str) -> String {
    source
        .replace(['-', '_'], " ")
        .trim_end_matches(|ch: char| ch.is_ascii_digit())
        .trim()
        .to_string()
}

/// Renders the plain context block; empty input yields an empty string.
pub fn render_context(results: &[RetrievalResult<'_>]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let blocks: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(idx, result)| {
            format!(
                "[Source {}: {}]\n{}",
                idx + 1,
                format_source_name(&result.chunk.source),
                result.chunk.text
            )
        })
        .collect();
    format!("{CONTEXT_HEADER}\n\n{}", blocks.join(BLOCK_SEPARATOR))
}

/// Renders the citation-annotated context block and its citation list.
pub fn render_context_with_citations(results: &[RetrievalResult<'_>]) -> RagContext {
    if results.is_empty() {
        return RagContext::default();
    }

    let citations = results
        .iter()
        .enumerate()
        .map(|(idx, result)| Citation {
            id: citation_id(idx + 1),
            source_title: format_source_name(&result.chunk.source),
            excerpt: excerpt(&result.chunk.text),
            similarity: similarity_percent(result.similarity),
        })
        .collect();

    let blocks: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(idx, result)| {
            let marker = idx + 1;
            format!(
                "[Source {marker}: {}]\nWhen citing this source, use the marker [{marker}].\n{}",
                format_source_name(&result.chunk.source),
                result.chunk.text
            )
        })
        .collect();
    let markers = (1..=results.len())
        .map(|n| format!("[{n}]"))
        .collect::<Vec<_>>()
        .join(", ");
    let context = format!(
        "TRUSTED MEDICAL SOURCES (cite using {markers} markers):\n\n{}",
        blocks.join(BLOCK_SEPARATOR)
    );

    RagContext { context, citations }
}

/// Citations referenced by `[N]` markers in a model answer, in first-mention order.
///
/// Markers outside the citation range and repeated markers are ignored.
pub fn cited_sources<'c>(answer: &str, citations: &'c [Citation]) -> Vec<&'c Citation> {
    let mut cited: Vec<&Citation> = Vec::new();
    let mut rest = answer;
    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find(']') else {
            break;
        };
        let mut inner = &rest[..close];
        if let Some(nested) = inner.rfind('[') {
            inner = &inner[nested + 1..];
        }
        if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
            if let Some(citation) = inner
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| citations.get(idx))
            {
                if !cited.iter().any(|c| c.id == citation.id) {
                    cited.push(citation);
                }
            }
        }
        rest = &rest[close + 1..];
    }
    cited
}

fn citation_id(marker: usize) -> String {
    format!("source-{marker}")
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn similarity_percent(similarity: f32) -> u8 {
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeChunk;
    use pretty_assertions::assert_eq;

    fn result(chunk: &KnowledgeChunk, similarity: f32) -> RetrievalResult<'_> {
        RetrievalResult { chunk, similarity }
    }

    #[test]
    fn formats_source_names() {
        assert_eq!(format_source_name("cystic-fibrosis_guide_2"), "cystic fibrosis guide");
        assert_eq!(format_source_name("surfactant_overview"), "surfactant overview");
        assert_eq!(format_source_name("  asthma  "), "asthma");
        assert_eq!(format_source_name("covid19"), "covid");
        assert_eq!(format_source_name("2024"), "");
    }

    #[test]
    fn empty_results_render_nothing() {
        assert_eq!(render_context(&[]), "");
        let cited = render_context_with_citations(&[]);
        assert!(cited.is_empty());
        assert_eq!(cited.context, "");
    }

    #[test]
    fn renders_plain_blocks() {
        let a = KnowledgeChunk::new("lung-health_101", 0, "Alveoli exchange gas.".into());
        let b = KnowledgeChunk::new("asthma", 3, "Inhalers open airways.".into());
        let context = render_context(&[result(&a, 0.9), result(&b, 0.5)]);
        assert_eq!(
            context,
            "TRUSTED MEDICAL SOURCES:\n\n[Source 1: lung health]\nAlveoli exchange gas.\n\n---\n\n[Source 2: asthma]\nInhalers open airways."
        );
    }

    #[test]
    fn citations_align_with_markers() {
        let chunks: Vec<KnowledgeChunk> = (0..3)
            .map(|i| KnowledgeChunk::new(&format!("src_{i}"), 0, format!("body {i}")))
            .collect();
        let results: Vec<_> = chunks
            .iter()
            .zip([0.914, 0.5049, 0.312])
            .map(|(c, s)| result(c, s))
            .collect();
        let rag = render_context_with_citations(&results);

        assert!(rag
            .context
            .starts_with("TRUSTED MEDICAL SOURCES (cite using [1], [2], [3] markers):\n\n"));
        assert_eq!(rag.citations.len(), 3);
        for (n, citation) in rag.citations.iter().enumerate() {
            let marker = n + 1;
            assert_eq!(citation.id, format!("source-{marker}"));
            let block = format!(
                "[Source {marker}: {}]\nWhen citing this source, use the marker [{marker}].\nbody {n}",
                citation.source_title
            );
            assert!(rag.context.contains(&block), "missing block {marker}");
        }
        let percents: Vec<u8> = rag.citations.iter().map(|c| c.similarity).collect();
        assert_eq!(percents, [91, 50, 31]);
    }

    #[test]
    fn excerpts_truncate_at_150_chars() {
        let long = "é".repeat(200);
        let chunk = KnowledgeChunk::new("doc", 0, long);
        let rag = render_context_with_citations(&[result(&chunk, 1.0)]);
        let excerpt = &rag.citations[0].excerpt;
        assert!(excerpt.ends_with("..."));
        assert_eq!(excerpt.chars().count(), 153);
        assert_eq!(rag.citations[0].similarity, 100);

        let exact = KnowledgeChunk::new("doc", 0, "x".repeat(150));
        let rag = render_context_with_citations(&[result(&exact, 0.0)]);
        assert_eq!(rag.citations[0].excerpt, "x".repeat(150));
        assert_eq!(rag.citations[0].similarity, 0);
    }

    #[test]
    fn citation_serializes_camel_case() {
        let citation = Citation {
            id: "source-1".into(),
            source_title: "asthma".into(),
            excerpt: "text".into(),
            similarity: 87,
        };
        let json = serde_json::to_value(&citation).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"id": "source-1", "sourceTitle": "asthma", "excerpt": "text", "similarity": 87})
        );
    }

    #[test]
    fn parses_cited_markers_from_answers() {
        let citations: Vec<Citation> = (1..=3)
            .map(|n| Citation {
                id: format!("source-{n}"),
                source_title: format!("s{n}"),
                excerpt: String::new(),
                similarity: 50,
            })
            .collect();
        let answer = "Use the inhaler daily [2]. Airways narrow [1][2], see [7] and [x] and [].";
        let ids: Vec<&str> = cited_sources(answer, &citations)
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, ["source-2", "source-1"]);
        assert!(cited_sources("no markers [0] here [", &citations).is_empty());
    }

    #[test]
    fn nested_brackets_still_yield_the_marker() {
        let citations: Vec<Citation> = (1..=3)
            .map(|n| Citation {
                id: format!("source-{n}"),
                source_title: format!("s{n}"),
                excerpt: String::new(),
                similarity: 50,
            })
            .collect();
        let ids: Vec<&str> = cited_sources("Wheezing [[1]] and [see [3]] or [a [2]", &citations)
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, ["source-1", "source-3", "source-2"]);
    }
}
