use crate::config::{Bm25Params, FieldWeights};
use crate::entity::CodeEntity;
use std::collections::{BTreeSet, HashMap};

/// Number of lexically indexed fields: name, full_name, signature, body
pub(crate) const FIELD_COUNT: usize = 4;

/// Split text into lowercase search terms.
///
/// Identifiers are emitted whole and also broken into their snake_case and
/// camelCase parts, so `processPayment` yields `processpayment`, `process`
/// and `payment`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut terms = Vec::new();

    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(|w| w.trim_matches('_'))
        .filter(|w| !w.is_empty())
    {
        terms.push(word.to_lowercase());

        let parts: Vec<&str> = word
            .split('_')
            .filter(|p| !p.is_empty())
            .flat_map(split_camel_case)
            .collect();

        if parts.len() > 1 {
            terms.extend(parts.into_iter().map(str::to_lowercase));
        }
    }

    terms
}

fn split_camel_case(word: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut parts = Vec::new();
    let mut start = 0;

    for i in 1..chars.len() {
        let (idx, current) = chars[i];
        let previous = chars[i - 1].1;
        let next_is_lower = chars.get(i + 1).is_some_and(|(_, c)| c.is_lowercase());

        // fooBar | foo1Bar | HTTPServer -> HTTP + Server
        let boundary = ((previous.is_lowercase() || previous.is_ascii_digit())
            && current.is_uppercase())
            || (previous.is_uppercase() && current.is_uppercase() && next_is_lower);

        if boundary {
            parts.push(&word[start..idx]);
            start = idx;
        }
    }

    parts.push(&word[start..]);
    parts
}

/// Per-entity term statistics for each lexical field
#[derive(Debug, Clone, Default)]
pub(crate) struct IndexedDoc {
    term_freqs: [HashMap<String, u32>; FIELD_COUNT],
    lengths: [u32; FIELD_COUNT],
}

impl IndexedDoc {
    pub(crate) fn from_entity(entity: &CodeEntity) -> Self {
        let fields = [
            entity.name.as_str(),
            entity.full_name.as_str(),
            entity.signature.as_str(),
            entity.body.as_str(),
        ];

        let mut doc = IndexedDoc::default();
        for (field, text) in fields.iter().enumerate() {
            let terms = tokenize(text);
            doc.lengths[field] = terms.len() as u32;
            for term in terms {
                *doc.term_freqs[field].entry(term).or_insert(0) += 1;
            }
        }
        doc
    }

    pub(crate) fn lengths(&self) -> [u32; FIELD_COUNT] {
        self.lengths
    }

    /// Distinct terms across all fields
    pub(crate) fn terms(&self) -> BTreeSet<&str> {
        self.term_freqs
            .iter()
            .flat_map(|freqs| freqs.keys().map(String::as_str))
            .collect()
    }
}

/// Weighted multi-field BM25 scorer
pub(crate) struct Bm25Scorer {
    params: Bm25Params,
    weights: [f32; FIELD_COUNT],
    avg_lengths: [f32; FIELD_COUNT],
    doc_count: usize,
}

impl Bm25Scorer {
    pub(crate) fn new(
        params: Bm25Params,
        weights: FieldWeights,
        length_totals: [u64; FIELD_COUNT],
        doc_count: usize,
    ) -> Self {
        let mut avg_lengths = [0.0; FIELD_COUNT];
        if doc_count > 0 {
            for (avg, total) in avg_lengths.iter_mut().zip(length_totals) {
                *avg = total as f32 / doc_count as f32;
            }
        }
        Self {
            params,
            weights: weights.as_array(),
            avg_lengths,
            doc_count,
        }
    }

    /// Inverse document frequency, always positive
    pub(crate) fn idf(&self, doc_freq: usize) -> f32 {
        let n = self.doc_count as f32;
        let df = doc_freq as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Contribution of one query term to one document
    pub(crate) fn term_score(&self, idf: f32, doc: &IndexedDoc, term: &str) -> f32 {
        let Bm25Params { k1, b } = self.params;
        let mut score = 0.0;

        for field in 0..FIELD_COUNT {
            let weight = self.weights[field];
            if weight == 0.0 {
                continue;
            }
            let Some(&tf) = doc.term_freqs[field].get(term) else {
                continue;
            };

            let tf = tf as f32;
            let norm = if self.avg_lengths[field] > 0.0 {
                1.0 - b + b * doc.lengths[field] as f32 / self.avg_lengths[field]
            } else {
                1.0
            };
            score += weight * (tf * (k1 + 1.0)) / (tf + k1 * norm);
        }

        idf * score
    }
}
