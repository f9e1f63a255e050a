//! Replace local image references in a document body.
//!
//! All references are matched in a single left-most-longest pass over the
//! body, treating each one as a literal. Data URLs need no escaping, and a
//! reference that is a prefix of another never matches inside it.

use aho_corasick::{AhoCorasick, MatchKind};
use inkdraft_blob::{ImageId, ImageRole};
use tracing::{debug, warn};

use crate::upload::UploadMapping;

/// Outcome of a rewrite
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RewriteReport {
    pub body: String,
    /// Total occurrences replaced
    pub replacements: usize,
    /// Content images whose reference was not found in the body
    pub mismatches: Vec<ImageId>,
}

pub struct ContentRewriter;

impl ContentRewriter {
    /// Replace every local reference in `body` with its remote URL
    ///
    /// A content entry whose reference does not occur is reported as a
    /// mismatch and otherwise ignored. A missing cover is not a mismatch:
    /// covers normally live outside the body.
    pub fn rewrite(body: &str, mapping: &UploadMapping) -> RewriteReport {
        let mut pairs: Vec<(String, String)> = Vec::with_capacity(mapping.len());
        let mut owners: Vec<(&ImageId, ImageRole)> = Vec::with_capacity(mapping.len());
        let mut mismatches = Vec::new();

        for entry in mapping.entries() {
            if entry.local_reference.is_empty() {
                warn!(id = %entry.image_id, "Mapping entry has an empty local reference");
                mismatches.push(entry.image_id.clone());
                continue;
            }
            if pairs.iter().any(|(from, _)| *from == entry.local_reference) {
                // Identical bytes staged twice share one inline reference
                warn!(id = %entry.image_id, "Local reference already mapped to another image");
                if entry.role == ImageRole::Content {
                    mismatches.push(entry.image_id.clone());
                }
                continue;
            }
            pairs.push((entry.local_reference.clone(), entry.remote.url.clone()));
            owners.push((&entry.image_id, entry.role));
        }

        let (body, counts) = replace_literals(body, &pairs);

        for ((id, role), count) in owners.into_iter().zip(&counts) {
            if *count == 0 && role == ImageRole::Content {
                warn!(id = %id, "Staged image not referenced in body");
                mismatches.push(id.clone());
            }
        }

        let replacements = counts.iter().sum();
        debug!(replacements, mismatches = mismatches.len(), "Rewrote body");
        RewriteReport {
            body,
            replacements,
            mismatches,
        }
    }
}

/// Replace each `from` with its `to`, returning per-pair occurrence counts
pub(crate) fn replace_literals(body: &str, pairs: &[(String, String)]) -> (String, Vec<usize>) {
    let mut counts = vec![0usize; pairs.len()];
    if pairs.is_empty() {
        return (body.to_string(), counts);
    }

    let searcher = AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(pairs.iter().map(|(from, _)| from.as_str()));

    let searcher = match searcher {
        Ok(searcher) => searcher,
        Err(e) => {
            warn!(error = %e, "Falling back to sequential replacement");
            return replace_sequentially(body, pairs);
        }
    };

    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    for found in searcher.find_iter(body) {
        let index = found.pattern().as_usize();
        out.push_str(&body[last..found.start()]);
        out.push_str(&pairs[index].1);
        counts[index] += 1;
        last = found.end();
    }
    out.push_str(&body[last..]);
    (out, counts)
}

/// Longest reference first so a shorter prefix never eats a longer one
fn replace_sequentially(body: &str, pairs: &[(String, String)]) -> (String, Vec<usize>) {
    let mut order: Vec<usize> = (0..pairs.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(pairs[i].0.len()));

    let mut counts = vec![0usize; pairs.len()];
    let mut out = body.to_string();
    for i in order {
        let (from, to) = &pairs[i];
        counts[i] = out.matches(from.as_str()).count();
        if counts[i] > 0 {
            out = out.replace(from.as_str(), to);
        }
    }
    (out, counts)
}
