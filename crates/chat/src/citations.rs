use std::collections::HashSet;

use sb_domain::conversation::Citation;

/// Accumulates citations across every tool call of a turn.
///
/// Keyed by `type:id`; the first occurrence wins and insertion order is
/// kept. The list handed back is capped at `max`.
#[derive(Debug)]
pub struct CitationCollector {
    max: usize,
    seen: HashSet<String>,
    citations: Vec<Citation>,
}

impl CitationCollector {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            seen: HashSet::new(),
            citations: Vec::new(),
        }
    }

    pub fn extend(&mut self, citations: impl IntoIterator<Item = Citation>) {
        for citation in citations {
            if self.seen.insert(citation.key()) {
                self.citations.push(citation);
            }
        }
    }

    /// Distinct citations seen so far, before the cap.
    pub fn len(&self) -> usize {
        self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    pub fn finish(mut self) -> Vec<Citation> {
        self.citations.truncate(self.max);
        self.citations
    }
}
