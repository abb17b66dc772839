use crate::pages::PageList;

/// Backend pages whose text contains the query, case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchIndex {
    pub query: String,
    pub hits: Vec<usize>,
}

impl SearchIndex {
    pub fn build(pages: &PageList, query: &str) -> Self {
        let query = fold_case(query.trim());
        if query.is_empty() {
            return Self::default();
        }
        let hits = pages
            .iter()
            .filter(|entry| {
                entry
                    .text()
                    .is_some_and(|text| fold_case(text).contains(&query))
            })
            .map(|entry| entry.index)
            .collect();
        Self { query, hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Lowercases one char at a time, so every folded char maps back to a
/// single source char. Page matching and highlighting both go through this.
pub fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Byte ranges of case-insensitive occurrences of `query` in `line`.
/// `query` must already be folded with [`fold_case`].
pub fn match_ranges(line: &str, query: &str) -> Vec<(usize, usize)> {
    if query.is_empty() {
        return Vec::new();
    }
    let needle: Vec<char> = query.chars().collect();
    // (source start, source end, folded char)
    let hay: Vec<(usize, usize, char)> = line
        .char_indices()
        .flat_map(|(start, c)| {
            let end = start + c.len_utf8();
            c.to_lowercase().map(move |folded| (start, end, folded))
        })
        .collect();

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;
    while i + needle.len() <= hay.len() {
        let matched = hay[i..i + needle.len()]
            .iter()
            .zip(&needle)
            .all(|((_, _, h), n)| h == n);
        let start = hay[i].0;
        let after_previous = ranges.last().map_or(true, |&(_, end)| start >= end);
        if matched && after_previous {
            ranges.push((start, hay[i + needle.len() - 1].1));
            i += needle.len();
        } else {
            i += 1;
        }
    }
    ranges
}
