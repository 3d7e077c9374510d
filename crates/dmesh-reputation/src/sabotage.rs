use dmesh_core::constants::*;
use dmesh_core::events::MeshEvent;
use dmesh_core::types::NodeId;
use std::collections::VecDeque;
use tokio::sync::RwLock;

const SABOTAGE_MIN_SAMPLE: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FeedbackKind {
    Negative,
    Positive,
}

#[derive(Clone, Copy, Debug)]
struct FeedbackEntry {
    reporter: NodeId,
    target: NodeId,
    kind: FeedbackKind,
    at_ms: u64,
}

/// Flags suspicious patterns in peer feedback rather than trusting any
/// single report at face value (§4.16). Three independent heuristics run
/// on every new negative report; any that trip emit a
/// `MeshEvent::SabotageFlagged` naming the heuristic and a confidence.
/// Positive reports are kept only as the counterpoint the disproportionate
/// heuristic checks for — they never trip anything on their own.
pub struct SabotageDetector {
    ledger: RwLock<VecDeque<FeedbackEntry>>,
    burst_window_ms: u64,
}

impl SabotageDetector {
    pub fn new(burst_window_ms: u64) -> Self {
        Self {
            ledger: RwLock::new(VecDeque::new()),
            burst_window_ms,
        }
    }

    pub async fn record_negative_report(&self, reporter: NodeId, target: NodeId, now_ms: u64) -> Vec<MeshEvent> {
        self.record(reporter, target, FeedbackKind::Negative, now_ms).await
    }

    pub async fn record_positive_report(&self, reporter: NodeId, target: NodeId, now_ms: u64) -> Vec<MeshEvent> {
        self.record(reporter, target, FeedbackKind::Positive, now_ms).await
    }

    async fn record(&self, reporter: NodeId, target: NodeId, kind: FeedbackKind, now_ms: u64) -> Vec<MeshEvent> {
        let mut ledger = self.ledger.write().await;
        ledger.push_back(FeedbackEntry { reporter, target, kind, at_ms: now_ms });
        if ledger.len() > SABOTAGE_LEDGER_CAP {
            let excess = ledger.len() - SABOTAGE_LEDGER_TRIM_TO;
            for _ in 0..excess {
                ledger.pop_front();
            }
        }

        let mut events = Vec::new();
        if kind != FeedbackKind::Negative {
            return events;
        }
        if let Some((source, conf)) = Self::disproportionate(&ledger, target) {
            events.push(MeshEvent::SabotageFlagged {
                node: source,
                heuristic: "disproportionate_negative".into(),
                confidence: conf,
            });
        }
        if let Some(conf) = Self::review_bombing(&ledger, reporter, target, now_ms, self.burst_window_ms) {
            events.push(MeshEvent::SabotageFlagged {
                node: reporter,
                heuristic: "review_bombing".into(),
                confidence: conf,
            });
        }
        if let Some(conf) = Self::collusion(&ledger, target, now_ms, self.burst_window_ms) {
            events.push(MeshEvent::SabotageFlagged {
                node: target,
                heuristic: "collusion_suspected".into(),
                confidence: conf,
            });
        }
        events
    }

    /// For target T, if one source S accounts for at least 80% of T's
    /// negative reports and at least one other source has given T
    /// positive feedback, S's reports look targeted rather than merited.
    fn disproportionate(ledger: &VecDeque<FeedbackEntry>, target: NodeId) -> Option<(NodeId, f64)> {
        let negatives: Vec<&FeedbackEntry> = ledger
            .iter()
            .filter(|e| e.target == target && e.kind == FeedbackKind::Negative)
            .collect();
        if negatives.len() < SABOTAGE_MIN_SAMPLE {
            return None;
        }
        let mut by_source: std::collections::HashMap<NodeId, usize> = std::collections::HashMap::new();
        for e in &negatives {
            *by_source.entry(e.reporter).or_insert(0) += 1;
        }
        let (&dominant_source, &count) = by_source.iter().max_by_key(|(_, count)| **count)?;
        let fraction = count as f64 / negatives.len() as f64;
        if fraction < SABOTAGE_DISPROPORTIONATE_FRACTION {
            return None;
        }
        let has_counterpoint = ledger
            .iter()
            .any(|e| e.target == target && e.kind == FeedbackKind::Positive && e.reporter != dominant_source);
        if !has_counterpoint {
            return None;
        }
        Some((dominant_source, fraction.min(SABOTAGE_DISPROPORTIONATE_MAX_CONFIDENCE)))
    }

    /// The same reporter filing a burst of negative reports against the
    /// same target within a short window.
    fn review_bombing(
        ledger: &VecDeque<FeedbackEntry>,
        reporter: NodeId,
        target: NodeId,
        now_ms: u64,
        window_ms: u64,
    ) -> Option<f64> {
        let count = ledger
            .iter()
            .filter(|e| {
                e.kind == FeedbackKind::Negative
                    && e.reporter == reporter
                    && e.target == target
                    && now_ms.saturating_sub(e.at_ms) <= window_ms
            })
            .count() as u32;
        if count >= SABOTAGE_REVIEW_BOMB_COUNT {
            Some(1.0)
        } else {
            None
        }
    }

    /// Multiple distinct reporters piling onto the same target within the
    /// same short window is weaker evidence than a single bad actor
    /// repeating itself, so this heuristic's confidence is discounted.
    fn collusion(ledger: &VecDeque<FeedbackEntry>, target: NodeId, now_ms: u64, window_ms: u64) -> Option<f64> {
        let reporters: std::collections::HashSet<NodeId> = ledger
            .iter()
            .filter(|e| e.kind == FeedbackKind::Negative && e.target == target && now_ms.saturating_sub(e.at_ms) <= window_ms)
            .map(|e| e.reporter)
            .collect();
        if reporters.len() >= 2 {
            Some(SABOTAGE_COLLUSION_DISCOUNT_CONFIDENCE)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_bombing_trips_review_bomb_heuristic() {
        let det = SabotageDetector::new(DEFAULT_SABOTAGE_BURST_WINDOW_MS);
        let reporter = NodeId::new();
        let target = NodeId::new();
        let mut last = Vec::new();
        for i in 0..SABOTAGE_REVIEW_BOMB_COUNT {
            last = det.record_negative_report(reporter, target, i as u64 * 1_000).await;
        }
        assert!(last.iter().any(|e| matches!(e, MeshEvent::SabotageFlagged { heuristic, .. } if heuristic == "review_bombing")));
    }

    #[tokio::test]
    async fn distinct_reporters_trip_collusion_heuristic() {
        let det = SabotageDetector::new(DEFAULT_SABOTAGE_BURST_WINDOW_MS);
        let target = NodeId::new();
        det.record_negative_report(NodeId::new(), target, 0).await;
        let second = det.record_negative_report(NodeId::new(), target, 100).await;
        assert!(second.iter().any(|e| matches!(e, MeshEvent::SabotageFlagged { heuristic, .. } if heuristic == "collusion_suspected")));
    }

    #[tokio::test]
    async fn spread_out_reports_trip_nothing() {
        let det = SabotageDetector::new(DEFAULT_SABOTAGE_BURST_WINDOW_MS);
        let reporter = NodeId::new();
        let events = det.record_negative_report(reporter, NodeId::new(), 0).await;
        assert!(events.is_empty());
    }

    /// A reporter with many distinct reporters each filing a handful of
    /// reports (spread thin) should never look like a single dominant
    /// source even though the target accumulates a lot of negatives.
    #[tokio::test]
    async fn many_reporters_each_below_threshold_never_trip_disproportionate() {
        let det = SabotageDetector::new(DEFAULT_SABOTAGE_BURST_WINDOW_MS);
        let target = NodeId::new();
        let mut last = Vec::new();
        for i in 0..10u64 {
            // spaced far apart so review-bombing/collusion windows never overlap.
            last = det.record_negative_report(NodeId::new(), target, i * 1_000_000).await;
        }
        assert!(!last
            .iter()
            .any(|e| matches!(e, MeshEvent::SabotageFlagged { heuristic, .. } if heuristic == "disproportionate_negative")));
    }

    /// A single source responsible for >=80% of a target's negative
    /// reports only trips the heuristic once some other source is on
    /// record giving that target positive feedback too.
    #[tokio::test]
    async fn dominant_source_trips_only_once_a_counterpoint_positive_exists() {
        let det = SabotageDetector::new(DEFAULT_SABOTAGE_BURST_WINDOW_MS);
        let target = NodeId::new();
        let dominant = NodeId::new();
        let minor = NodeId::new();

        for i in 0..4u64 {
            det.record_negative_report(dominant, target, i * 1_000_000).await;
        }
        let events = det.record_negative_report(minor, target, 4_000_000).await;
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, MeshEvent::SabotageFlagged { heuristic, .. } if heuristic == "disproportionate_negative")),
            "without a positive counterpoint the heuristic should not trip"
        );

        let positive_events = det.record_positive_report(NodeId::new(), target, 5_000_000).await;
        assert!(positive_events.is_empty(), "positive reports never flag anything on their own");

        let events = det.record_negative_report(dominant, target, 6_000_000).await;
        assert!(events.iter().any(
            |e| matches!(e, MeshEvent::SabotageFlagged { node, heuristic, .. } if *node == dominant && heuristic == "disproportionate_negative")
        ));
    }
}
