use dmesh_core::constants::{DEFAULT_MAX_PROPOSALS, DEFAULT_MAX_RECURSION_DEPTH};
use dmesh_core::types::{
    DecompositionProposal, DelegationTarget, Level, ProposalStrategy, Reversibility, SubTask,
    TaskAttributes, TaskConstraints, TaskId, Verifiability,
};
use std::collections::BTreeSet;

const CONNECTIVES: &[&str] = &["after that", "then", "finally"];
const VERIFIABLE_KEYWORDS: &[&str] = &["test", "check", "verify"];
const UNVERIFIABLE_KEYWORDS: &[&str] = &["design", "brainstorm"];

/// Splits an oversized or under-specified task into delegatable sub-tasks
/// (§4.8). Deliberately heuristic rather than content-aware: depth,
/// complexity and capability requirements drive every decision so the
/// behavior is deterministic and auditable.
pub struct TaskDecomposer {
    pub max_recursion_depth: u32,
    pub max_proposals: usize,
}

impl Default for TaskDecomposer {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_proposals: DEFAULT_MAX_PROPOSALS,
        }
    }
}

impl TaskDecomposer {
    /// A task is worth delegating away rather than executed locally when
    /// it is more than trivially complex or needs capabilities the
    /// originator may not hold.
    pub fn should_delegate(&self, attrs: &TaskAttributes) -> bool {
        attrs.complexity != Level::Low || !attrs.required_capabilities.is_empty()
    }

    /// A task's outcome is hard to verify automatically when it is both
    /// highly critical and carries low inherent verifiability — those are
    /// exactly the cases the Liability Firebreak (§4.12) treats as
    /// shallow-delegation-only.
    pub fn assess_verifiability(&self, attrs: &TaskAttributes) -> Verifiability {
        match (attrs.criticality, attrs.verifiability) {
            (Level::High, Level::Low) => Verifiability::Unverifiable,
            (_, Level::Low) => Verifiability::Partial,
            (_, Level::Medium) => Verifiability::Partial,
            (_, Level::High) => Verifiability::Verifiable,
        }
    }

    /// Produce up to `max_proposals` candidate decompositions, ranked by
    /// score (§4.8's "generateProposals").
    pub fn decompose(
        &self,
        text: &str,
        attrs: &TaskAttributes,
        constraints: &TaskConstraints,
    ) -> Vec<DecompositionProposal> {
        let mut proposals = self.generate_proposals(text, attrs, constraints);
        proposals.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        proposals.truncate(self.max_proposals);
        proposals
    }

    fn generate_proposals(
        &self,
        text: &str,
        attrs: &TaskAttributes,
        constraints: &TaskConstraints,
    ) -> Vec<DecompositionProposal> {
        if !self.should_delegate(attrs) {
            let leaf = self.leaf_subtask(text, attrs, constraints, 0);
            return vec![DecompositionProposal {
                strategy: ProposalStrategy::FlatParallel,
                sub_tasks: vec![leaf],
                score: 1.0,
            }];
        }

        let sub_texts = extract_sub_texts(text);

        let recursive = self.build_recursive(&sub_texts, attrs, constraints, 0);
        let recursive_score = Self::score_proposal(&recursive);

        let flat = self.build_flat(&sub_texts, attrs, constraints);
        let flat_score = Self::score_proposal(&flat);

        let sequential = self.build_sequential(&sub_texts, attrs, constraints);
        let sequential_score = Self::score_proposal(&sequential);

        vec![
            DecompositionProposal {
                strategy: ProposalStrategy::Recursive,
                sub_tasks: recursive,
                score: recursive_score,
            },
            DecompositionProposal {
                strategy: ProposalStrategy::FlatParallel,
                sub_tasks: flat,
                score: flat_score,
            },
            DecompositionProposal {
                strategy: ProposalStrategy::StrictlySequential,
                sub_tasks: sequential,
                score: sequential_score,
            },
        ]
    }

    /// Favor proposals with more parallelism (more distinct parallel
    /// groups relative to sub-task count) and fewer dependency edges.
    fn score_proposal(sub_tasks: &[SubTask]) -> f64 {
        if sub_tasks.is_empty() {
            return 0.0;
        }
        let groups: BTreeSet<u32> = sub_tasks.iter().map(|t| t.parallel_group).collect();
        let parallelism = groups.len() as f64 / sub_tasks.len() as f64;
        let dep_edges: usize = sub_tasks.iter().map(|t| t.dependencies.len()).sum();
        let dep_penalty = dep_edges as f64 / (sub_tasks.len() as f64 * sub_tasks.len().max(1) as f64);
        (parallelism - dep_penalty).clamp(0.0, 1.0)
    }

    /// One sub-task per extracted piece, all in distinct parallel groups.
    fn build_flat(&self, sub_texts: &[String], attrs: &TaskAttributes, constraints: &TaskConstraints) -> Vec<SubTask> {
        let child_constraints = constraints.split(sub_texts.len());
        sub_texts
            .iter()
            .enumerate()
            .map(|(i, t)| self.leaf_subtask(t, attrs, &child_constraints, i as u32))
            .collect()
    }

    /// One sub-task per extracted piece, chained in extraction order.
    fn build_sequential(&self, sub_texts: &[String], attrs: &TaskAttributes, constraints: &TaskConstraints) -> Vec<SubTask> {
        let child_constraints = constraints.split(sub_texts.len());
        let mut previous: Option<TaskId> = None;
        let mut out = Vec::with_capacity(sub_texts.len());
        for t in sub_texts {
            let mut sub = self.leaf_subtask(t, attrs, &child_constraints, 0);
            if let Some(prev) = previous {
                sub.dependencies.insert(prev);
            }
            previous = Some(sub.id);
            out.push(sub);
        }
        out
    }

    /// One sub-task per extracted piece; any piece whose text reads as
    /// unverifiable is itself replaced with a "define acceptance criteria
    /// / implement / verify" triple, recursing up to `max_recursion_depth`.
    fn build_recursive(
        &self,
        sub_texts: &[String],
        attrs: &TaskAttributes,
        constraints: &TaskConstraints,
        depth: u32,
    ) -> Vec<SubTask> {
        let child_constraints = constraints.split(sub_texts.len());
        sub_texts
            .iter()
            .enumerate()
            .flat_map(|(i, t)| self.expand_if_unverifiable(t, attrs, &child_constraints, depth, i as u32))
            .collect()
    }

    fn expand_if_unverifiable(
        &self,
        text: &str,
        attrs: &TaskAttributes,
        constraints: &TaskConstraints,
        depth: u32,
        parallel_group: u32,
    ) -> Vec<SubTask> {
        if depth >= self.max_recursion_depth || text_verifiability(text) != Verifiability::Unverifiable {
            return vec![self.leaf_subtask(text, attrs, constraints, parallel_group)];
        }

        let triple = [
            format!("define acceptance criteria for: {text}"),
            format!("implement: {text}"),
            format!("verify: {text}"),
        ];
        let child_constraints = constraints.split(triple.len());

        let mut previous: Option<TaskId> = None;
        let mut out = Vec::new();
        for piece in &triple {
            let mut children = self.expand_if_unverifiable(piece, attrs, &child_constraints, depth + 1, parallel_group);
            if let Some(prev) = previous {
                if let Some(first) = children.first_mut() {
                    first.dependencies.insert(prev);
                }
            }
            previous = children.last().map(|s| s.id);
            out.append(&mut children);
        }
        out
    }

    fn leaf_subtask(
        &self,
        text: &str,
        attrs: &TaskAttributes,
        constraints: &TaskConstraints,
        parallel_group: u32,
    ) -> SubTask {
        let target = if attrs.criticality == Level::High && attrs.reversibility == Reversibility::Low {
            DelegationTarget::Human
        } else {
            DelegationTarget::Ai
        };
        SubTask {
            id: TaskId::new(),
            text: text.to_string(),
            attributes: attrs.clone(),
            dependencies: BTreeSet::new(),
            parallel_group,
            delegation_target: target,
            constraints: constraints.clone(),
        }
    }
}

/// Tags free text verifiable (contains test/check/verify), unverifiable
/// (contains design/brainstorm), or partial, per §4.8's `assessVerifiability`.
fn text_verifiability(text: &str) -> Verifiability {
    let lower = text.to_lowercase();
    if VERIFIABLE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Verifiability::Verifiable
    } else if UNVERIFIABLE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Verifiability::Unverifiable
    } else {
        Verifiability::Partial
    }
}

/// Extracts sub-task texts by attempting, in order: numbered lists, bullet
/// lists, sequential connectives, sentence boundaries. Falls back to the
/// whole text as a single sub-task if none yields more than one piece.
fn extract_sub_texts(text: &str) -> Vec<String> {
    let numbered = split_numbered_list(text);
    if numbered.len() > 1 {
        return numbered;
    }
    let bullets = split_bullet_list(text);
    if bullets.len() > 1 {
        return bullets;
    }
    let connectives = split_connectives(text);
    if connectives.len() > 1 {
        return connectives;
    }
    let sentences = split_sentences(text);
    if sentences.len() > 1 {
        return sentences;
    }
    vec![text.trim().to_string()]
}

/// Lines like `1. foo`, `2) bar`.
fn split_numbered_list(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        let digit_end = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(0);
        if digit_end == 0 {
            continue;
        }
        let rest = &trimmed[digit_end..];
        let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'));
        if let Some(rest) = rest {
            let rest = rest.trim();
            if !rest.is_empty() {
                out.push(rest.to_string());
            }
        }
    }
    out
}

/// Lines like `- foo`, `* bar`, `• baz`.
fn split_bullet_list(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        for marker in ["- ", "* ", "\u{2022} "] {
            if let Some(rest) = trimmed.strip_prefix(marker) {
                let rest = rest.trim();
                if !rest.is_empty() {
                    out.push(rest.to_string());
                }
                break;
            }
        }
    }
    out
}

/// Splits on "then", "after that", "finally" (checked longest-first so
/// "after that" wins over a bare "then" appearing later in the same text).
fn split_connectives(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut cuts = vec![0usize];
    let mut search_from = 0usize;
    while search_from < lower.len() {
        let mut earliest: Option<(usize, usize)> = None;
        for conn in CONNECTIVES {
            if let Some(rel) = lower[search_from..].find(conn) {
                let pos = search_from + rel;
                let better = match earliest {
                    Some((p, _)) => pos < p,
                    None => true,
                };
                if better {
                    earliest = Some((pos, conn.len()));
                }
            }
        }
        match earliest {
            Some((pos, len)) => {
                cuts.push(pos);
                cuts.push(pos + len);
                search_from = pos + len;
            }
            None => break,
        }
    }

    let mut out = Vec::new();
    let mut i = 0;
    while i < cuts.len() {
        let start = cuts[i];
        let end = cuts.get(i + 1).copied().unwrap_or(text.len());
        let piece = text[start..end].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        i += 2;
    }
    out
}

/// Splits on `.`, `!`, `?`.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if matches!(c, '.' | '!' | '?') {
            let piece = current.trim();
            if !piece.is_empty() {
                out.push(piece.to_string());
            }
            current.clear();
        } else {
            current.push(c);
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(complexity: Level) -> TaskAttributes {
        TaskAttributes {
            complexity,
            criticality: Level::Medium,
            verifiability: Level::Medium,
            reversibility: Reversibility::High,
            estimated_cost_usd: 10.0,
            estimated_duration_ms: 60_000,
            estimated_tokens: 10_000,
            required_capabilities: BTreeSet::new(),
        }
    }

    fn constraints() -> TaskConstraints {
        TaskConstraints {
            max_cost_usd: 10.0,
            max_duration_ms: 60_000,
            max_tokens: 10_000,
            tool_allowlist: vec!["shell".into()],
        }
    }

    #[test]
    fn low_complexity_task_is_not_delegated() {
        let dec = TaskDecomposer::default();
        assert!(!dec.should_delegate(&attrs(Level::Low)));
    }

    #[test]
    fn high_complexity_task_produces_multiple_ranked_proposals() {
        let dec = TaskDecomposer::default();
        let proposals = dec.decompose("do the thing", &attrs(Level::High), &constraints());
        assert!(!proposals.is_empty());
        assert!(proposals.len() <= dec.max_proposals);
        for w in proposals.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }

    #[test]
    fn critical_irreversible_leaf_routes_to_human() {
        let dec = TaskDecomposer::default();
        let mut a = attrs(Level::Low);
        a.criticality = Level::High;
        a.reversibility = Reversibility::Low;
        let leaf = dec.leaf_subtask("risky", &a, &constraints(), 0);
        assert_eq!(leaf.delegation_target, DelegationTarget::Human);
    }

    #[test]
    fn numbered_list_is_extracted_before_other_strategies() {
        let text = "1. fetch the data\n2. clean the data\n3. report the results";
        let pieces = extract_sub_texts(text);
        assert_eq!(pieces, vec!["fetch the data", "clean the data", "report the results"]);
    }

    #[test]
    fn bullet_list_is_extracted_when_no_numbered_list_present() {
        let text = "- fetch the data\n- clean the data";
        let pieces = extract_sub_texts(text);
        assert_eq!(pieces, vec!["fetch the data", "clean the data"]);
    }

    #[test]
    fn sequential_connectives_are_extracted_when_no_list_present() {
        let text = "fetch the data then clean the data finally report the results";
        let pieces = extract_sub_texts(text);
        assert_eq!(pieces, vec!["fetch the data", "clean the data", "report the results"]);
    }

    #[test]
    fn sentence_boundaries_are_the_last_resort() {
        let text = "Fetch the data. Clean the data.";
        let pieces = extract_sub_texts(text);
        assert_eq!(pieces, vec!["Fetch the data", "Clean the data"]);
    }

    #[test]
    fn unstructured_text_falls_back_to_a_single_sub_task() {
        let pieces = extract_sub_texts("do the thing");
        assert_eq!(pieces, vec!["do the thing"]);
    }

    #[test]
    fn flat_proposal_has_one_sub_task_per_extracted_piece() {
        let dec = TaskDecomposer::default();
        let sub_tasks = dec.build_flat(
            &["a".into(), "b".into(), "c".into()],
            &attrs(Level::High),
            &constraints(),
        );
        assert_eq!(sub_tasks.len(), 3);
        let groups: BTreeSet<u32> = sub_tasks.iter().map(|t| t.parallel_group).collect();
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn recursive_proposal_expands_unverifiable_pieces_into_a_triple() {
        let dec = TaskDecomposer::default();
        let sub_tasks = dec.build_recursive(&["design the api".into()], &attrs(Level::High), &constraints(), 0);
        assert_eq!(sub_tasks.len(), 3);
        assert!(sub_tasks[0].text.starts_with("define acceptance criteria for"));
        assert!(sub_tasks[1].text.starts_with("implement"));
        assert!(sub_tasks[2].text.starts_with("verify"));
    }

    #[test]
    fn recursive_proposal_leaves_verifiable_pieces_alone() {
        let dec = TaskDecomposer::default();
        let sub_tasks = dec.build_recursive(&["run the tests".into()], &attrs(Level::High), &constraints(), 0);
        assert_eq!(sub_tasks.len(), 1);
        assert_eq!(sub_tasks[0].text, "run the tests");
    }

    #[test]
    fn recursion_bottoms_out_at_configured_depth() {
        let dec = TaskDecomposer {
            max_recursion_depth: 0,
            max_proposals: 3,
        };
        let sub_tasks = dec.build_recursive(&["design the thing".into()], &attrs(Level::High), &constraints(), 0);
        assert_eq!(sub_tasks.len(), 1);
        assert_eq!(sub_tasks[0].text, "design the thing");
    }
}
