//! Reciprocal Rank Fusion: score = Σ 1/(k + rank + 1)
//!
//! Merges ranked lists from heterogeneous sources without normalizing their
//! native scores. Items are identified across lists by [`fusion_key`].

use fanout_shared::{FusedItem, RankedItem};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Default smoothing constant
pub const DEFAULT_K: u32 = 60;

/// Hex digits of the content hash kept in a fusion key
const CONTENT_KEY_HEX_LEN: usize = 16;

/// One sub-lane's ranked output, best first
#[derive(Debug, Clone, Copy)]
pub struct RankedList<'a> {
    pub lane: &'a str,
    pub items: &'a [RankedItem],
}

/// Identity of an item across lists: the source id when present, else a
/// truncated SHA-256 of title + content.
pub fn fusion_key(item: &RankedItem) -> String {
    match item.id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let mut hasher = Sha256::new();
            hasher.update(item.title.as_bytes());
            hasher.update(item.content.as_bytes());
            let digest = hex::encode(hasher.finalize());
            format!("sha256:{}", &digest[..CONTENT_KEY_HEX_LEN])
        }
    }
}

/// RRF contribution of an item at zero-based `rank`
pub fn rrf_score(k: u32, rank: usize) -> f64 {
    1.0 / (k as f64 + rank as f64 + 1.0)
}

/// Fuse ranked lists with RRF.
///
/// Each list is truncated to `max_per_list` before scoring. An item repeated
/// within one list counts once, at its best rank. The output is sorted by
/// fused score descending; equal scores keep first-seen order.
pub fn fuse(lists: &[RankedList<'_>], k: u32, max_per_list: usize, max_results: usize) -> Vec<FusedItem> {
    let mut fused = collect(lists, max_per_list, |rank| rrf_score(k, rank));

    // Stable sort keeps first-seen order on ties
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(max_results);
    fused
}

/// Plain concatenation in list order (RRF disabled). Duplicates are merged
/// into their first occurrence; scores stay 0.
pub fn concat(lists: &[RankedList<'_>], max_per_list: usize, max_results: usize) -> Vec<FusedItem> {
    let mut fused = collect(lists, max_per_list, |_| 0.0);
    fused.truncate(max_results);
    fused
}

fn collect<S>(lists: &[RankedList<'_>], max_per_list: usize, score: S) -> Vec<FusedItem>
where
    S: Fn(usize) -> f64,
{
    let mut fused: Vec<FusedItem> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for list in lists {
        let mut seen: HashSet<String> = HashSet::new();
        for (rank, item) in list.items.iter().take(max_per_list).enumerate() {
            let key = fusion_key(item);
            if !seen.insert(key.clone()) {
                continue;
            }
            let contribution = score(rank);
            match index.get(&key).copied() {
                Some(at) => {
                    let entry = &mut fused[at];
                    entry.fused_score += contribution;
                    if !entry.contributing_lanes.iter().any(|l| l == list.lane) {
                        entry.contributing_lanes.push(list.lane.to_string());
                    }
                }
                None => {
                    index.insert(key.clone(), fused.len());
                    fused.push(FusedItem {
                        key,
                        item: item.clone(),
                        fused_score: contribution,
                        contributing_lanes: vec![list.lane.to_string()],
                    });
                }
            }
        }
    }
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(source: &str, ids: &[&str]) -> Vec<RankedItem> {
        ids.iter().map(|id| RankedItem::new(id, id, source)).collect()
    }

    #[test]
    fn test_rrf_score_formula() {
        assert!((rrf_score(60, 0) - 1.0 / 61.0).abs() < 1e-12);
        assert!((rrf_score(60, 4) - 1.0 / 65.0).abs() < 1e-12);
    }

    #[test]
    fn test_shared_item_ranks_first() {
        let a = items("fulltext", &["x", "shared"]);
        let b = items("graph", &["shared", "y"]);
        let lists = [
            RankedList { lane: "fulltext", items: &a },
            RankedList { lane: "graph", items: &b },
        ];

        let fused = fuse(&lists, DEFAULT_K, 20, 10);
        assert_eq!(fused[0].key, "shared");
        assert_eq!(fused[0].contributing_lanes, vec!["fulltext", "graph"]);
        let expected = rrf_score(60, 1) + rrf_score(60, 0);
        assert!((fused[0].fused_score - expected).abs() < 1e-12);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_repeats_within_a_list_count_once() {
        let a = items("fulltext", &["dup", "dup", "dup", "x"]);
        let b = items("graph", &["y", "x"]);
        let lists = [
            RankedList { lane: "fulltext", items: &a },
            RankedList { lane: "graph", items: &b },
        ];

        let fused = fuse(&lists, DEFAULT_K, 20, 10);
        let dup = fused.iter().find(|f| f.key == "dup").unwrap();
        assert!((dup.fused_score - rrf_score(60, 0)).abs() < 1e-12);
        assert_eq!(dup.contributing_lanes, vec!["fulltext"]);

        // Two lanes agreeing beats one lane repeating itself
        assert_eq!(fused[0].key, "x");
        let expected = rrf_score(60, 3) + rrf_score(60, 1);
        assert!((fused[0].fused_score - expected).abs() < 1e-12);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let a = items("fulltext", &["a"]);
        let b = items("graph", &["b"]);
        let lists = [
            RankedList { lane: "fulltext", items: &a },
            RankedList { lane: "graph", items: &b },
        ];
        let fused = fuse(&lists, DEFAULT_K, 20, 10);
        let keys: Vec<&str> = fused.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_truncation() {
        let a = items("fulltext", &["a", "b", "c", "d"]);
        let lists = [RankedList { lane: "fulltext", items: &a }];
        assert_eq!(fuse(&lists, DEFAULT_K, 2, 10).len(), 2);
        assert_eq!(fuse(&lists, DEFAULT_K, 20, 3).len(), 3);
    }

    #[test]
    fn test_content_key_for_anonymous_items() {
        let first = RankedItem::anonymous("Title", "body", "vector_primary");
        let second = RankedItem::anonymous("Title", "body", "vector_local");
        let key = fusion_key(&first);
        assert!(key.starts_with("sha256:"));
        assert_eq!(key.len(), "sha256:".len() + 16);
        assert_eq!(key, fusion_key(&second));

        let other = RankedItem::anonymous("Title", "different body", "graph");
        assert_ne!(key, fusion_key(&other));
    }

    #[test]
    fn test_concat_preserves_list_order() {
        let a = items("fulltext", &["a1", "a2"]);
        let b = items("graph", &["b1", "a1"]);
        let lists = [
            RankedList { lane: "fulltext", items: &a },
            RankedList { lane: "graph", items: &b },
        ];
        let fused = concat(&lists, 20, 10);
        let keys: Vec<&str> = fused.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["a1", "a2", "b1"]);
        assert!(fused.iter().all(|f| f.fused_score == 0.0));
        assert_eq!(fused[0].contributing_lanes, vec!["fulltext", "graph"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(fuse(&[], DEFAULT_K, 20, 10).is_empty());
    }
}
