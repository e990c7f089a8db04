//! Data for the relationship views: a nearest-neighbour graph over sampled
//! titles and word frequencies for a word cloud. Drawing happens client side.

use std::collections::HashMap;
use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::semantic::index::IndexError;
use crate::semantic::Catalog;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it",
    "of", "on", "or", "that", "the", "this", "to", "with", "your", "you", "what", "why", "www",
    "com", "http", "https",
];

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub position: usize,
    pub title: String,
    pub url: String,
    /// Used by the UI to colour nodes by site
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: usize,
    pub target: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarityGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordCount {
    pub word: String,
    pub count: usize,
}

/// Sample up to `sample_size` of `positions` and link each sampled title to
/// its `neighbors` nearest sampled titles. Edges are reported once per
/// unordered pair.
pub fn similarity_graph(
    catalog: &Catalog,
    positions: &[usize],
    sample_size: usize,
    neighbors: usize,
    seed: Option<u64>,
) -> Result<SimilarityGraph, IndexError> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let valid: Vec<usize> = positions
        .iter()
        .copied()
        .filter(|&p| p < catalog.len())
        .collect();

    let mut sample: Vec<usize> = if valid.len() > sample_size {
        valid.choose_multiple(&mut rng, sample_size).copied().collect()
    } else {
        valid
    };
    sample.sort_unstable();
    sample.dedup();

    let mut edges: Vec<GraphEdge> = Vec::new();
    for &source in &sample {
        let Some(query) = catalog.index.vector(source) else {
            continue;
        };
        // one extra to account for the node itself
        let nearest = catalog.index.search_within(query, &sample, neighbors + 1)?;
        for neighbor in nearest
            .into_iter()
            .filter(|n| n.position != source)
            .take(neighbors)
        {
            let (a, b) = if source < neighbor.position {
                (source, neighbor.position)
            } else {
                (neighbor.position, source)
            };
            if !edges.iter().any(|e| e.source == a && e.target == b) {
                edges.push(GraphEdge {
                    source: a,
                    target: b,
                    distance: neighbor.distance,
                });
            }
        }
    }

    let nodes = sample
        .iter()
        .map(|&position| GraphNode {
            position,
            title: catalog.titles[position].clone(),
            url: catalog.urls[position].clone(),
            host: host_of(&catalog.urls[position]),
        })
        .collect();

    Ok(SimilarityGraph { nodes, edges })
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.trim_start_matches("www.").to_string()))
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'_-]*").expect("static regex"))
}

/// Most frequent words across `titles`, highest count first, ties by word.
pub fn word_cloud<'a>(
    titles: impl IntoIterator<Item = &'a str>,
    max_words: usize,
) -> Vec<WordCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for title in titles {
        for word in word_pattern().find_iter(title) {
            let word = word.as_str().to_lowercase();
            if word.chars().count() < 2 || STOP_WORDS.contains(&word.as_str()) {
                continue;
            }
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut words: Vec<WordCount> = counts
        .into_iter()
        .map(|(word, count)| WordCount { word, count })
        .collect();
    words.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
    words.truncate(max_words);
    words
}
