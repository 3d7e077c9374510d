use dmesh_core::types::{Slo, TaskResult};

/// The four-dimensional normalized verdict computed after a task result
/// arrives (§4.13). Each dimension is in `[0,1]`: `1.0` means
/// "exactly at or under budget", lower values indicate overage, and
/// overage is floored at `0.0` rather than going negative.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutcomeVector {
    pub quality: f64,
    pub latency: f64,
    pub cost: f64,
    pub tokens: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutcomeVerdict {
    pub vector: OutcomeVector,
    pub passed: bool,
    /// The dimension + value that failed, if any. Only the single worst
    /// failing dimension is reported (§4.13).
    pub failure_reason: Option<String>,
}

/// Multi-dimensional SLO pass/fail over a completed task result (spec
/// §4.13). Distinct from the Contract Store's single-priority-order
/// check (§4.10): this component scores *every* dimension rather than
/// short-circuiting on the first budget exceeded, which is what feeds
/// escrow slashing and behavioral scoring decisions downstream.
pub struct OutcomeVerifier;

impl OutcomeVerifier {
    pub fn verify(result: &TaskResult, slo: &Slo) -> OutcomeVerdict {
        let vector = OutcomeVector {
            quality: result.quality_score().unwrap_or(1.0).clamp(0.0, 1.0),
            latency: normalized_budget_ratio(result.duration_ms as f64, slo.max_duration_ms as f64),
            cost: normalized_budget_ratio(result.cost_usd, slo.max_cost_usd),
            tokens: normalized_budget_ratio(result.tokens_used as f64, slo.max_tokens as f64),
        };

        let quality_floor = slo.min_quality_score.unwrap_or(0.0);
        let mut failures: Vec<(&str, f64, f64)> = Vec::new();
        if vector.quality < quality_floor {
            failures.push(("quality", vector.quality, quality_floor));
        }
        if vector.latency < 1.0 {
            failures.push(("latency", vector.latency, 1.0));
        }
        if vector.cost < 1.0 {
            failures.push(("cost", vector.cost, 1.0));
        }
        if vector.tokens < 1.0 {
            failures.push(("tokens", vector.tokens, 1.0));
        }

        if failures.is_empty() {
            return OutcomeVerdict {
                vector,
                passed: true,
                failure_reason: None,
            };
        }

        // Worst dimension: the one furthest below its own floor.
        let worst = failures
            .iter()
            .min_by(|a, b| (a.1 - a.2).partial_cmp(&(b.1 - b.2)).unwrap())
            .unwrap();
        OutcomeVerdict {
            vector,
            passed: false,
            failure_reason: Some(format!(
                "{} dimension {:.3} below floor {:.3}",
                worst.0, worst.1, worst.2
            )),
        }
    }
}

/// `1.0` at or under budget; otherwise `budget / actual`, clamped to
/// `[0,1]`. A zero budget with zero actual usage is a perfect score; a
/// zero budget with any nonzero usage is an immediate overage.
fn normalized_budget_ratio(actual: f64, budget: f64) -> f64 {
    if actual <= budget {
        return 1.0;
    }
    if budget <= 0.0 {
        return 0.0;
    }
    (budget / actual).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmesh_core::types::{Finding, NodeId, TaskId, TaskResultStatus};
    use uuid::Uuid;

    fn slo() -> Slo {
        Slo {
            max_duration_ms: 5_000,
            max_tokens: 1_000,
            max_cost_usd: 0.10,
            min_quality_score: Some(0.7),
            required_checkpoints: None,
        }
    }

    fn result(duration_ms: u64, tokens: u64, cost: f64, quality: Option<f64>) -> TaskResult {
        TaskResult {
            task_id: TaskId::new(),
            peer_node_id: NodeId::new(),
            peer_session_id: Uuid::new_v4(),
            status: TaskResultStatus::Completed,
            findings: quality
                .map(|q| vec![Finding { key: "quality".into(), value: q }])
                .unwrap_or_default(),
            tokens_used: tokens,
            cost_usd: cost,
            duration_ms,
        }
    }

    #[test]
    fn within_every_budget_passes() {
        let verdict = OutcomeVerifier::verify(&result(3_000, 600, 0.04, Some(0.9)), &slo());
        assert!(verdict.passed);
        assert_eq!(verdict.vector.latency, 1.0);
    }

    #[test]
    fn missing_quality_defaults_to_perfect_score() {
        let verdict = OutcomeVerifier::verify(&result(100, 10, 0.01, None), &slo());
        assert_eq!(verdict.vector.quality, 1.0);
        assert!(verdict.passed);
    }

    #[test]
    fn duration_overage_fails_and_names_latency() {
        let verdict = OutcomeVerifier::verify(&result(9_000, 600, 0.04, Some(0.9)), &slo());
        assert!(!verdict.passed);
        assert!(verdict.failure_reason.unwrap().contains("latency"));
    }

    #[test]
    fn low_quality_below_floor_fails() {
        let verdict = OutcomeVerifier::verify(&result(100, 10, 0.01, Some(0.3)), &slo());
        assert!(!verdict.passed);
        assert!(verdict.failure_reason.unwrap().contains("quality"));
    }
}
