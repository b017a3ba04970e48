//! Completion marker detection over assistant text.

/// Sentinel the agent emits once the spec is fully done.
pub const COMPLETION_MARKER: &str = "<promise>COMPLETE</promise>";

/// True iff `text` contains the completion marker (case-sensitive substring).
pub fn contains_marker(text: &str) -> bool {
    text.contains(COMPLETION_MARKER)
}

/// Accumulates assistant text for one iteration and tracks whether the marker
/// has been observed.
///
/// Each push only rescans the tail that could complete a marker, so scanning
/// is linear in the total text length. Once observed, completion stays set.
#[derive(Debug, Default)]
pub struct CompletionScanner {
    text: String,
    scanned: usize,
    complete: bool,
}

impl CompletionScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text fragment and return whether the marker has been seen so far.
    pub fn push(&mut self, fragment: &str) -> bool {
        self.text.push_str(fragment);
        if !self.complete {
            let mut start = self
                .scanned
                .saturating_sub(COMPLETION_MARKER.len().saturating_sub(1));
            while !self.text.is_char_boundary(start) {
                start -= 1;
            }
            self.complete = contains_marker(&self.text[start..]);
            self.scanned = self.text.len();
        }
        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_marker_as_exact_case_sensitive_substring() {
        assert!(contains_marker("All done. <promise>COMPLETE</promise>"));
        assert!(!contains_marker("<promise>complete</promise>"));
        assert!(!contains_marker("COMPLETE"));
        assert!(!contains_marker("<promise>COMPLETE</promise"));
        assert!(!contains_marker(""));
    }

    #[test]
    fn scanner_reports_completion_as_soon_as_marker_arrives() {
        let mut scanner = CompletionScanner::new();
        assert!(!scanner.push("Implemented the parser."));
        assert!(scanner.push("\n<promise>COMPLETE</promise>"));
        assert!(scanner.is_complete());
    }

    #[test]
    fn scanner_finds_marker_split_across_fragments() {
        let mut scanner = CompletionScanner::new();
        assert!(!scanner.push("done <prom"));
        assert!(!scanner.push("ise>COMP"));
        assert!(scanner.push("LETE</promise>"));
        assert_eq!(scanner.text(), "done <promise>COMPLETE</promise>");
    }

    #[test]
    fn completion_is_monotonic_under_further_appends() {
        let mut scanner = CompletionScanner::new();
        scanner.push("<promise>COMPLETE</promise>");
        for fragment in ["", "more", "<promise>", "é✓"] {
            assert!(scanner.push(fragment));
        }
        assert!(contains_marker(scanner.text()));
    }

    #[test]
    fn scanner_agrees_with_full_rescan_on_every_split() {
        let text = "ünïcödé prefix <promise>COMPLETE</promise> suffix ✓";
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain([text.len()])
            .collect();
        for &a in &boundaries {
            for &b in boundaries.iter().filter(|&&b| b >= a) {
                let mut scanner = CompletionScanner::new();
                let mut observed = false;
                for fragment in [&text[..a], &text[a..b], &text[b..]] {
                    observed = scanner.push(fragment);
                    assert_eq!(observed, contains_marker(scanner.text()));
                }
                assert!(observed);
                assert_eq!(scanner.into_text(), text);
            }
        }
    }
}
