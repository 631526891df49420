//! Failed-job output analysis.
//!
//! Ranks lines from the output of failed jobs so the informative ones
//! surface. Common lines appear in many failures and are easy to find by
//! hand, so rarity raises the rank; trigram entropy raises it for lines
//! with real content and lowers it for boilerplate; the log on the
//! entropy keeps random-noise lines from dominating.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{FailureLine, ScoredLine};

static RE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*? - (STDOUT|STDERR|EXECUTOR):\s*").unwrap());
static RE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_URITRUNCATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*https?://[^?]+\?").unwrap());

/// Remove the `TIMESTAMP - STDOUT:` style prefix of a log line.
pub fn remove_prefix(line: &str) -> String {
    RE_PREFIX.replace(line, "").into_owned()
}

/// Normalize a log line: strip the prefix, trim, collapse whitespace runs.
pub fn clean_line(line: &str) -> String {
    let line = remove_prefix(line);
    RE_SPACE.replace_all(line.trim(), " ").into_owned()
}

/// Truncate at the query marker of the first URL, so transient URL tails
/// do not fragment otherwise identical lines.
pub fn compare_line(line: &str) -> &str {
    match RE_URITRUNCATE.find(line) {
        Some(m) => &line[..m.end()],
        None => line,
    }
}

/// Cleaned `(compare_line, clean_line)` pairs of one output, deduplicated
/// by compare-line, empty lines dropped.
pub fn unique_lines(output: &str) -> Vec<(String, String)> {
    let mut seen: Vec<(String, String)> = Vec::new();
    for raw in output.split('\n') {
        let clean = clean_line(raw);
        if clean.is_empty() {
            continue;
        }
        let compare = compare_line(&clean).to_string();
        if seen.iter().any(|(c, _)| *c == compare) {
            continue;
        }
        seen.push((compare, clean));
    }
    seen
}

/// Character trigrams of a line, in order, with repetition.
pub fn trigrams(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// Probability of each trigram: the fraction of outputs it appears in.
pub fn trigram_probabilities(outputs: &[&str]) -> HashMap<String, f64> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for output in outputs {
        let mut seen_here: Vec<String> = Vec::new();
        for (compare, _) in unique_lines(output) {
            for trigram in trigrams(&compare) {
                if !seen_here.contains(&trigram) {
                    seen_here.push(trigram);
                }
            }
        }
        for trigram in seen_here {
            *counts.entry(trigram).or_insert(0) += 1;
        }
    }
    let n = outputs.len() as f64;
    if n == 0.0 {
        return HashMap::new();
    }
    counts
        .into_iter()
        .map(|(trigram, count)| (trigram, count as f64 / n))
        .collect()
}

/// Shannon entropy of a line under the trigram probabilities.
pub fn trigram_entropy(line: &str, probabilities: &HashMap<String, f64>) -> f64 {
    -trigrams(line)
        .iter()
        .filter_map(|t| probabilities.get(t))
        .map(|p| p * p.log2())
        .sum::<f64>()
}

struct LineData {
    entropy: f64,
    clean: String,
    job_ids: Vec<String>,
}

/// Rank the output lines of a set of failed jobs.
///
/// Lines sharing the exact same set of jobs cluster into one group; each
/// group surfaces its highest-scoring member and carries the rest as
/// common lines. Groups come back sorted by descending score.
pub fn rank_errors(jobs: &[(String, String)]) -> Vec<FailureLine> {
    let outputs: Vec<&str> = jobs.iter().map(|(_, output)| output.as_str()).collect();
    let probabilities = trigram_probabilities(&outputs);

    // first-seen order is the tie-break for equal scores
    let mut order: Vec<String> = Vec::new();
    let mut lines: HashMap<String, LineData> = HashMap::new();
    for (job_id, output) in jobs {
        for (compare, clean) in unique_lines(output) {
            match lines.get_mut(&compare) {
                Some(data) => data.job_ids.push(job_id.clone()),
                None => {
                    lines.insert(
                        compare.clone(),
                        LineData {
                            entropy: trigram_entropy(&compare, &probabilities),
                            clean,
                            job_ids: vec![job_id.clone()],
                        },
                    );
                    order.push(compare);
                }
            }
        }
    }

    let total_lines = lines.len() as f64;
    let mut group_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, FailureLine> = HashMap::new();

    for compare in &order {
        let data = &lines[compare];
        let entropy = if data.entropy == 0.0 { 1.0 } else { data.entropy };
        let score = entropy.ln() * data.job_ids.len() as f64 / total_lines;

        let mut sorted_ids = data.job_ids.clone();
        sorted_ids.sort_unstable();
        let key = sorted_ids.join(" ");

        match groups.get_mut(&key) {
            Some(group) => {
                group.common_lines.push(ScoredLine {
                    line: data.clean.clone(),
                    score,
                });
                if score > group.score {
                    group.score = score;
                    group.line = data.clean.clone();
                }
            }
            None => {
                groups.insert(
                    key.clone(),
                    FailureLine {
                        score,
                        line: data.clean.clone(),
                        common_lines: vec![ScoredLine {
                            line: data.clean.clone(),
                            score,
                        }],
                        jobs: data.job_ids.clone(),
                    },
                );
                group_order.push(key);
            }
        }
    }

    let mut ranked: Vec<FailureLine> = group_order
        .into_iter()
        .map(|key| groups.remove(&key).expect("group inserted above"))
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    for group in &mut ranked {
        group
            .common_lines
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    }
    ranked
}
