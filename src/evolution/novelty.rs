//! Novelty archive for keeping structurally distinct candidates.
//!
//! Exact duplicates are caught by a content hash over whitespace-normalized
//! text. Near duplicates are caught by comparing a small structural feature
//! vector against every archived entry.

use std::collections::HashMap;

use crate::schema::{ArchiveStats, NoveltyConfig};

/// Keywords that suggest a suite probes edge cases.
const EDGE_CASE_KEYWORDS: [&str; 6] = ["None", "empty", "zero", "negative", "boundary", "edge"];

/// Content digest of a candidate.
pub type CodeHash = blake3::Hash;

/// Structural features of a test suite.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeFeatures {
    pub num_lines: usize,
    pub num_test_functions: usize,
    pub num_assertions: usize,
    pub num_imports: usize,
    pub edge_case_coverage: usize,
    pub code_length: usize,
    pub unique_identifiers: usize,
    pub has_parametrize: bool,
    pub has_fixture: bool,
    pub has_mock: bool,
    pub has_raises: bool,
}

impl CodeFeatures {
    /// Extract features from candidate text.
    pub fn extract(code: &str) -> Self {
        Self {
            num_lines: code.split('\n').count(),
            num_test_functions: code.matches("def test_").count(),
            num_assertions: code.matches("assert").count(),
            num_imports: code.matches("import").count(),
            edge_case_coverage: EDGE_CASE_KEYWORDS
                .iter()
                .filter(|k| code.contains(*k))
                .count(),
            code_length: code.chars().count(),
            unique_identifiers: count_unique_identifiers(code),
            has_parametrize: code.contains("@pytest.mark.parametrize"),
            has_fixture: code.contains("@pytest.fixture"),
            has_mock: code.to_lowercase().contains("mock"),
            has_raises: code.contains("pytest.raises") || code.contains("assertRaises"),
        }
    }

    fn numeric(&self) -> [usize; 7] {
        [
            self.num_lines,
            self.num_test_functions,
            self.num_assertions,
            self.num_imports,
            self.edge_case_coverage,
            self.code_length,
            self.unique_identifiers,
        ]
    }

    fn flags(&self) -> [bool; 4] {
        [
            self.has_parametrize,
            self.has_fixture,
            self.has_mock,
            self.has_raises,
        ]
    }

    /// Similarity in `[0, 1]`: the mean of per-feature similarities.
    ///
    /// Numeric features contribute `1 - |a - b| / max(a, b, 1)`, flags
    /// contribute 1 when equal and 0 otherwise.
    pub fn similarity(&self, other: &CodeFeatures) -> f64 {
        let numeric = self.numeric().into_iter().zip(other.numeric()).map(|(a, b)| {
            let (a, b) = (a as f64, b as f64);
            1.0 - (a - b).abs() / a.max(b).max(1.0)
        });
        let flags = self
            .flags()
            .into_iter()
            .zip(other.flags())
            .map(|(a, b)| if a == b { 1.0 } else { 0.0 });

        let (sum, count) = numeric
            .chain(flags)
            .fold((0.0, 0usize), |(sum, n), s| (sum + s, n + 1));
        sum / count as f64
    }
}

/// Count distinct ASCII identifiers delimited by word boundaries.
///
/// A maximal run of word characters counts only if it is made entirely of
/// `[A-Za-z0-9_]` and does not start with a digit.
fn count_unique_identifiers(code: &str) -> usize {
    let mut seen = std::collections::HashSet::new();
    for run in code.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        let mut chars = run.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            seen.insert(run);
        }
    }
    seen.len()
}

/// Hash candidate text after collapsing whitespace runs to single spaces.
pub fn content_hash(code: &str) -> CodeHash {
    let mut hasher = blake3::Hasher::new();
    for (i, word) in code.split_whitespace().enumerate() {
        if i > 0 {
            hasher.update(b" ");
        }
        hasher.update(word.as_bytes());
    }
    hasher.finalize()
}

/// An archived candidate.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub code: String,
    pub hash: CodeHash,
    pub features: CodeFeatures,
    pub fitness: f64,
}

/// Bounded archive of structurally distinct candidates.
#[derive(Debug, Clone)]
pub struct NoveltyArchive {
    similarity_threshold: f64,
    max_size: usize,
    /// Multiplicity of each hash among `entries`.
    hashes: HashMap<CodeHash, usize>,
    entries: Vec<ArchiveEntry>,
}

impl NoveltyArchive {
    /// Create a new archive.
    pub fn new(similarity_threshold: f64, max_size: usize) -> Self {
        Self {
            similarity_threshold,
            max_size,
            hashes: HashMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn from_config(config: &NoveltyConfig) -> Self {
        Self::new(config.similarity_threshold, config.archive_size)
    }

    /// Whether `code` is neither an exact nor a near duplicate of an entry.
    pub fn is_novel(&self, code: &str) -> bool {
        if self.hashes.contains_key(&content_hash(code)) {
            return false;
        }

        let features = CodeFeatures::extract(code);
        !self
            .entries
            .iter()
            .any(|entry| features.similarity(&entry.features) >= self.similarity_threshold)
    }

    /// Insert unconditionally, evicting the lowest-fitness entry when full.
    pub fn add(&mut self, code: &str, fitness: f64) {
        let hash = content_hash(code);
        *self.hashes.entry(hash).or_insert(0) += 1;
        self.entries.push(ArchiveEntry {
            code: code.to_string(),
            hash,
            features: CodeFeatures::extract(code),
            fitness,
        });

        if self.entries.len() > self.max_size {
            self.entries.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
            if let Some(evicted) = self.entries.pop() {
                log::debug!(
                    "novelty archive evicted entry with fitness {:.4}",
                    evicted.fitness
                );
                self.forget_hash(&evicted.hash);
            }
        }
    }

    /// Add `code` only if it is novel. Returns whether it was added.
    pub fn add_if_novel(&mut self, code: &str, fitness: f64) -> bool {
        if self.is_novel(code) {
            self.add(code, fitness);
            true
        } else {
            false
        }
    }

    fn forget_hash(&mut self, hash: &CodeHash) {
        if let Some(count) = self.hashes.get_mut(hash) {
            *count -= 1;
            if *count == 0 {
                self.hashes.remove(hash);
            }
        }
    }

    /// One minus the mean pairwise similarity; 1.0 with fewer than two entries.
    pub fn diversity_score(&self) -> f64 {
        if self.entries.len() < 2 {
            return 1.0;
        }

        let mut total = 0.0;
        let mut pairs = 0usize;
        for i in 0..self.entries.len() {
            for j in (i + 1)..self.entries.len() {
                total += self.entries[i]
                    .features
                    .similarity(&self.entries[j].features);
                pairs += 1;
            }
        }

        (1.0 - total / pairs as f64).clamp(0.0, 1.0)
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
        self.entries.clear();
    }

    pub fn statistics(&self) -> ArchiveStats {
        ArchiveStats {
            size: self.entries.len(),
            diversity_score: self.diversity_score(),
            avg_fitness: if self.entries.is_empty() {
                0.0
            } else {
                self.entries.iter().map(|e| e.fitness).sum::<f64>() / self.entries.len() as f64
            },
        }
    }
}
