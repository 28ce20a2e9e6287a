use crate::enrich::analysis::AnalysisOutcome;
use crate::enrich::models::{TextAnalysis, VisionAnalysis};
use serde::Serialize;

/// Which derived values made it into the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreSignals {
    pub category: bool,
    pub subcategory: bool,
    pub material: bool,
    pub style: bool,
    pub functionality: bool,
    pub characteristics: bool,
    pub dimensions: bool,
    pub vision_color: bool,
    pub vision_material: bool,
    pub vision_style: bool,
    pub image_count: usize,
}

impl ScoreSignals {
    /// A degraded text analysis contributes nothing: its category is a
    /// stand-in, not a derived value.
    pub fn collect(
        analysis: &AnalysisOutcome,
        has_dimensions: bool,
        vision: &VisionAnalysis,
        image_count: usize,
    ) -> Self {
        let text = (!analysis.degraded).then_some(&analysis.analysis);
        let from_text = |pick: fn(&TextAnalysis) -> bool| {
            text.map(pick).unwrap_or(false)
        };
        Self {
            category: from_text(|a| a.category.is_some()),
            subcategory: from_text(|a| a.subcategory.is_some()),
            material: from_text(|a| a.material.is_some()),
            style: from_text(|a| a.style.is_some()),
            functionality: from_text(|a| a.functionality.is_some()),
            characteristics: from_text(|a| a.characteristics.is_some()),
            dimensions: has_dimensions,
            vision_color: vision.color.is_some(),
            vision_material: vision.material.is_some(),
            vision_style: vision.style.is_some(),
            image_count,
        }
    }
}

/// Additive heuristic in `[0, 100]`.
pub fn confidence_score(signals: &ScoreSignals) -> u8 {
    let weighted: [(bool, usize); 10] = [
        (signals.category, 20),
        (signals.subcategory, 15),
        (signals.material, 10),
        (signals.style, 10),
        (signals.functionality, 10),
        (signals.characteristics, 5),
        (signals.dimensions, 10),
        (signals.vision_color, 10),
        (signals.vision_material, 5),
        (signals.vision_style, 5),
    ];
    let points: usize = weighted
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, points)| points)
        .sum();
    let image_bonus = signals.image_count.saturating_mul(2).min(10);
    points.saturating_add(image_bonus).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_signals_score_79() {
        let signals = ScoreSignals {
            category: true,
            subcategory: true,
            material: true,
            style: true,
            dimensions: true,
            vision_color: true,
            image_count: 2,
            ..ScoreSignals::default()
        };
        assert_eq!(confidence_score(&signals), 79);
    }

    #[test]
    fn everything_present_caps_at_100() {
        let signals = ScoreSignals {
            category: true,
            subcategory: true,
            material: true,
            style: true,
            functionality: true,
            characteristics: true,
            dimensions: true,
            vision_color: true,
            vision_material: true,
            vision_style: true,
            image_count: 50,
        };
        assert_eq!(confidence_score(&signals), 100);
    }

    #[test]
    fn nothing_scores_zero_and_image_bonus_is_capped() {
        assert_eq!(confidence_score(&ScoreSignals::default()), 0);
        let images_only = ScoreSignals {
            image_count: usize::MAX,
            ..ScoreSignals::default()
        };
        assert_eq!(confidence_score(&images_only), 10);
    }

    #[test]
    fn degraded_analysis_contributes_nothing() {
        let outcome = AnalysisOutcome {
            analysis: TextAnalysis::minimal(Some("Cushions")),
            degraded: true,
            attempts: 3,
        };
        let signals = ScoreSignals::collect(&outcome, true, &VisionAnalysis::default(), 1);
        assert!(!signals.category);
        assert_eq!(confidence_score(&signals), 12);
    }

    #[test]
    fn collects_parsed_fields() {
        let outcome = AnalysisOutcome {
            analysis: TextAnalysis {
                category: Some("Lamps".into()),
                characteristics: Some("dimmable".into()),
                ..TextAnalysis::default()
            },
            degraded: false,
            attempts: 1,
        };
        let vision = VisionAnalysis {
            style: Some("industrial".into()),
            ..VisionAnalysis::default()
        };
        let signals = ScoreSignals::collect(&outcome, false, &vision, 0);
        assert!(signals.category && signals.characteristics && signals.vision_style);
        assert_eq!(confidence_score(&signals), 30);
    }
}
