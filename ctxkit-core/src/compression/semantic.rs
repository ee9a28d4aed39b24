//! Extractive compression: keep the most informative lines.
//!
//! Lines are scored by the rarity of their words across the document (an
//! inverse document frequency over lines), normalized by length. The top
//! `ratio` share is kept in original order; elided runs become `...`.

use super::{Compressor, DEFAULT_RATIO, MAX_RATIO, MIN_RATIO};
use anyhow::Result;
use std::collections::{HashMap, HashSet};

pub struct SemanticCompressor {
    ratio: f64,
}

impl Default for SemanticCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_RATIO)
    }
}

impl SemanticCompressor {
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio: ratio.clamp(MIN_RATIO, MAX_RATIO),
        }
    }
}

const ELISION: &str = "...";

impl Compressor for SemanticCompressor {
    fn compress(&self, content: &str) -> Result<String> {
        let candidates: Vec<(usize, &str, HashSet<String>)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| (index, line, words(line)))
            .collect();
        let Some(&(first, _, _)) = candidates.first() else {
            return Ok(content.trim().to_string());
        };
        if candidates.len() <= 2 {
            return Ok(content.trim().to_string());
        }

        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for (_, _, terms) in &candidates {
            for word in terms {
                *document_frequency.entry(word.as_str()).or_default() += 1;
            }
        }

        let total = candidates.len() as f64;
        let mut scored: Vec<(usize, &str, f64)> = candidates
            .iter()
            .map(|(index, line, terms)| {
                let mut score: f64 = terms
                    .iter()
                    .map(|word| {
                        let df = document_frequency.get(word.as_str()).copied().unwrap_or(1) as f64;
                        (total / df).ln() + 1.0
                    })
                    .sum::<f64>()
                    / (terms.len().max(1) as f64).sqrt();
                if line.trim_start().starts_with('#') || *index == first {
                    score *= 2.0;
                }
                (*index, *line, score)
            })
            .collect();

        let keep = ((total * self.ratio).ceil() as usize).clamp(1, candidates.len());
        scored.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));
        let mut kept: Vec<(usize, &str)> = scored
            .into_iter()
            .take(keep)
            .map(|(index, line, _)| (index, line))
            .collect();
        kept.sort_unstable_by_key(|(index, _)| *index);

        let mut output: Vec<&str> = Vec::with_capacity(kept.len() * 2);
        let mut previous: Option<usize> = None;
        for (index, line) in kept {
            let skipped_content = match previous {
                Some(prev) => candidates.iter().any(|(c, _, _)| *c > prev && *c < index),
                None => first < index,
            };
            if skipped_content {
                output.push(ELISION);
            }
            output.push(line);
            previous = Some(index);
        }
        if previous.is_some_and(|last| candidates.iter().any(|(c, _, _)| *c > last)) {
            output.push(ELISION);
        }
        Ok(output.join("\n"))
    }
}

fn words(line: &str) -> HashSet<String> {
    line.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|word| word.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_roughly_ratio_of_lines() {
        let content = (0..20)
            .map(|i| {
                if i % 5 == 0 {
                    format!("unique insight number {i} about quantum caching")
                } else {
                    "the the the same filler".to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let output = SemanticCompressor::new(0.2).compress(&content).expect("compress");
        let kept: Vec<&str> = output.lines().filter(|line| *line != ELISION).collect();
        assert_eq!(kept.len(), 4);
        assert!(kept.iter().all(|line| line.starts_with("unique insight")));
    }

    #[test]
    fn short_content_is_returned_trimmed() {
        let output = SemanticCompressor::default().compress("  one line \n").expect("compress");
        assert_eq!(output, "one line");
    }
}
