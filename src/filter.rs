//! Structural section filtering of rendered markdown.
//!
//! Removal operates on the heading tree, not on string search: a matched
//! heading takes its whole subtree (everything until the next heading at the
//! same or a shallower level) with it. Fenced code blocks are opaque; a `#`
//! inside one is never a heading.

use tracing::debug;

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub markdown: String,
    pub warnings: Vec<String>,
}

/// Drop sections whose heading matches any exclusion pattern
/// (case-insensitive substring). Returns the surviving markdown and one
/// warning per removed section.
pub fn filter_sections(markdown: &str, exclude: &[String]) -> FilterOutcome {
    let patterns: Vec<String> = exclude.iter().map(|p| p.to_lowercase()).collect();

    let mut out = String::with_capacity(markdown.len());
    let mut warnings = Vec::new();
    let mut in_fence = false;
    let mut skip_below: Option<u8> = None;

    for line in markdown.lines() {
        if is_fence_delimiter(line) {
            in_fence = !in_fence;
        }

        if !in_fence || is_fence_delimiter(line) {
            if let Some(level) = heading_level(line) {
                match skip_below {
                    Some(skip_level) if level > skip_level => {
                        // Still inside the removed subtree.
                    }
                    _ => {
                        skip_below = None;
                        if heading_matches(line, level, &patterns) {
                            let title = line.trim_start_matches('#').trim();
                            warnings.push(format!("excluded section: {title}"));
                            skip_below = Some(level);
                        }
                    }
                }
            }
        }

        if skip_below.is_none() {
            out.push_str(line);
            out.push('\n');
        }
    }

    debug!(removed = warnings.len(), "section filter complete");
    FilterOutcome {
        markdown: out,
        warnings,
    }
}

fn is_fence_delimiter(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// ATX heading level, or `None` for non-heading lines. Requires a space
/// after the hashes, as CommonMark does.
fn heading_level(line: &str) -> Option<u8> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if rest.starts_with(' ') || rest.is_empty() {
        Some(hashes as u8)
    } else {
        None
    }
}

fn heading_matches(line: &str, level: u8, patterns: &[String]) -> bool {
    let title = line[level as usize..].trim().to_lowercase();
    patterns.iter().any(|p| title.contains(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excl(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn removes_matched_section_and_its_body() {
        let md = "# Introduction\nintro text\n\n# References\n[1] A paper\n[2] Another\n";
        let outcome = filter_sections(md, &excl(&["references"]));
        assert!(outcome.markdown.contains("intro text"));
        assert!(!outcome.markdown.contains("[1] A paper"));
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("References"));
    }

    #[test]
    fn removal_takes_deeper_subsections() {
        let md = "## Acknowledgments\nthanks\n### Funding\nmoney\n## Appendix\nkept\n";
        let outcome = filter_sections(md, &excl(&["acknowledgment"]));
        assert!(!outcome.markdown.contains("thanks"));
        assert!(!outcome.markdown.contains("money"));
        assert!(outcome.markdown.contains("kept"));
    }

    #[test]
    fn removal_stops_at_same_level_heading() {
        let md = "# References\n[1]\n# Conclusion\nfinal words\n";
        let outcome = filter_sections(md, &excl(&["references"]));
        assert!(outcome.markdown.contains("final words"));
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let md = "# 7. REFERENCES AND NOTES\nbody\n";
        let outcome = filter_sections(md, &excl(&["references"]));
        assert!(!outcome.markdown.contains("body"));
    }

    #[test]
    fn hash_inside_code_fence_is_not_a_heading() {
        let md = "# Methods\n```python\n# references to other code\nx = 1\n```\nafter\n";
        let outcome = filter_sections(md, &excl(&["references"]));
        assert!(outcome.markdown.contains("x = 1"));
        assert!(outcome.markdown.contains("after"));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn consecutive_excluded_sections_are_both_removed() {
        let md = "# References\n[1]\n# Acknowledgements\nthanks\n# Appendix\nkept\n";
        let outcome = filter_sections(md, &excl(&["references", "acknowledgement"]));
        assert!(!outcome.markdown.contains("[1]"));
        assert!(!outcome.markdown.contains("thanks"));
        assert!(outcome.markdown.contains("kept"));
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[test]
    fn no_match_leaves_text_untouched() {
        let md = "# Introduction\ntext\n";
        let outcome = filter_sections(md, &excl(&["references"]));
        assert_eq!(outcome.markdown, md);
        assert!(outcome.warnings.is_empty());
    }
}
