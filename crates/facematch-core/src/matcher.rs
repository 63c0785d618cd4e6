//! Nearest-neighbour matching of query embeddings against the enrolled gallery.

use crate::types::{Embedding, LabeledIdentity, MatchResult};

/// Default Euclidean distance threshold for a positive match.
///
/// Conventional cut-off for 128-d ResNet face descriptors.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Strategy for mapping a query embedding to an enrolled label.
///
/// Implementations must agree on label selection: the nearest stored vector
/// wins, `distance <= threshold` is a match, and exact ties resolve to the
/// identity enrolled first.
pub trait Matcher: Send + Sync {
    fn find_best_match(&self, query: &Embedding) -> MatchResult;
}

/// Immutable snapshot of every enrolled identity, in enrollment order.
///
/// Matching is an exact linear scan over all stored vectors; galleries are
/// small (tens to low hundreds of identities).
#[derive(Debug, Clone)]
pub struct Gallery {
    identities: Vec<LabeledIdentity>,
    threshold: f32,
}

impl Gallery {
    pub fn new(identities: Vec<LabeledIdentity>, threshold: f32) -> Self {
        Self {
            identities,
            threshold,
        }
    }

    pub fn empty(threshold: f32) -> Self {
        Self::new(Vec::new(), threshold)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn identities(&self) -> &[LabeledIdentity] {
        &self.identities
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.identities.iter().any(|i| i.label == label)
    }

    /// Total number of stored vectors across all identities.
    pub fn embedding_count(&self) -> usize {
        self.identities.iter().map(|i| i.embeddings.len()).sum()
    }

    /// Every (label, vector) pair, identities in enrollment order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Embedding)> + '_ {
        self.identities.iter().flat_map(|identity| {
            identity
                .embeddings
                .iter()
                .map(move |e| (identity.label.as_str(), e))
        })
    }

    /// Copy of this gallery with `embedding` appended to `label`.
    ///
    /// An unknown label is added as a new identity at the end.
    pub fn with_appended(&self, label: &str, embedding: Embedding) -> Gallery {
        let mut identities = self.identities.clone();
        match identities.iter_mut().find(|i| i.label == label) {
            Some(identity) => identity.embeddings.push(embedding),
            None => identities.push(LabeledIdentity::new(label, vec![embedding])),
        }
        Gallery::new(identities, self.threshold)
    }

    /// Copy of this gallery with `identity` enrolled after all existing ones.
    pub fn with_created(&self, identity: LabeledIdentity) -> Gallery {
        let mut identities = self.identities.clone();
        identities.push(identity);
        Gallery::new(identities, self.threshold)
    }
}

impl Matcher for Gallery {
    fn find_best_match(&self, query: &Embedding) -> MatchResult {
        let mut best_distance = f32::INFINITY;
        let mut best_label: Option<&str> = None;

        // Strict `<` keeps the earliest-enrolled identity on exact ties.
        for (label, stored) in self.entries() {
            let distance = query.euclidean_distance(stored);
            if distance < best_distance {
                best_distance = distance;
                best_label = Some(label);
            }
        }

        match best_label {
            Some(label) if best_distance <= self.threshold => MatchResult {
                label: label.to_string(),
                distance: best_distance,
            },
            _ => MatchResult::unknown(best_distance),
        }
    }
}
