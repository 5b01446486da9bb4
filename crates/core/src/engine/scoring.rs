//! Fit scoring for a single item against a single user

use serde::{Deserialize, Serialize};

use crate::domain::item::{Item, MechanismTrack, RiskFlag, Texture};
use crate::domain::profile::{SkinType, UserProfile};
use crate::errors::DomainError;

/// Science score used when the user has not stated any goals.
pub const NEUTRAL_SCIENCE: f64 = 50.0;
/// Platform score used when the item has no social data.
pub const NEUTRAL_SOCIAL: f64 = 0.5;
/// Engineering score used when the item has no experience data.
pub const NEUTRAL_ENGINEERING: f64 = 70.0;

const PILLING_PENALTY: f64 = 35.0;
const STICKINESS_PENALTY: f64 = 25.0;
const TEXTURE_PENALTY: f64 = 10.0;

/// Weights for the three sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight for mechanism fit against the user's goals (default: 0.5)
    pub science: f64,
    /// Weight for community reception (default: 0.3)
    pub social: f64,
    /// Weight for texture and wear experience (default: 0.2)
    pub engineering: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { science: 0.5, social: 0.3, engineering: 0.2 }
    }
}

impl ScoringWeights {
    /// Weights must be finite, non-negative and sum to something positive
    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in
            [("science", self.science), ("social", self.social), ("engineering", self.engineering)]
        {
            if !value.is_finite() || value < 0.0 {
                return Err(DomainError::InvalidWeight {
                    field: format!("weights.{field}"),
                    value: value.to_string(),
                });
            }
        }

        if self.sum() <= 0.0 {
            return Err(DomainError::InvalidWeight {
                field: "weights".to_owned(),
                value: self.sum().to_string(),
            });
        }
        Ok(())
    }

    fn sum(&self) -> f64 {
        self.science + self.social + self.engineering
    }
}

/// Tunables for the scorer, normally built from `[engine]` configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub weights: ScoringWeights,
    /// Irritation-report rate above which sensitive users are protected (default: 0.10)
    pub veto_burn_rate: f64,
    /// Whether sensitive skin is a veto signal on its own (default: true)
    pub sensitive_skin_veto: bool,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self { weights: ScoringWeights::default(), veto_burn_rate: 0.10, sensitive_skin_veto: true }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<(), DomainError> {
        self.weights.validate()?;
        if !self.veto_burn_rate.is_finite() || !(0.0..=1.0).contains(&self.veto_burn_rate) {
            return Err(DomainError::InvalidWeight {
                field: "veto_burn_rate".to_owned(),
                value: self.veto_burn_rate.to_string(),
            });
        }
        Ok(())
    }
}

/// Result of scoring one item for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub science: f64,
    pub social: f64,
    pub engineering: f64,
    /// Weighted total in `0..=100`; zero when vetoed or when no goal has data
    pub total: f64,
    pub vetoed: bool,
    pub veto_reason: Option<String>,
    /// Goal tracks the item has mechanism data for
    pub coverage: Vec<MechanismTrack>,
}

impl ScoreBreakdown {
    /// Safe and relevant enough to fill a scored slot
    pub fn is_eligible(&self) -> bool {
        !self.vetoed && self.total > 0.0
    }
}

/// Scores an item for a user. Implementations must be pure and deterministic.
pub trait FitScorer: Send + Sync {
    fn score(&self, item: &Item, user: &UserProfile) -> ScoreBreakdown;
}

/// Default scorer: safety veto, then a weighted blend of science, social and engineering
#[derive(Debug, Clone)]
pub struct DeterministicFitScorer {
    policy: ScoringPolicy,
}

impl Default for DeterministicFitScorer {
    fn default() -> Self {
        Self { policy: ScoringPolicy::default() }
    }
}

impl DeterministicFitScorer {
    pub fn new(policy: ScoringPolicy) -> Result<Self, DomainError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Reason the item is unsafe for this user, if any
    pub fn veto_reason(&self, item: &Item, user: &UserProfile) -> Option<String> {
        let burn_rate = item.social_stats.burn_rate();
        let burn_exceeded = burn_rate > self.policy.veto_burn_rate;

        if user.is_barrier_impaired() {
            let hits: Vec<&str> = RiskFlag::BARRIER_VETO
                .iter()
                .filter(|flag| item.risk_flags.contains(flag))
                .map(|flag| flag.as_str())
                .collect();
            if !hits.is_empty() {
                return Some(format!("impaired barrier: contains {}", hits.join(", ")));
            }
            if burn_exceeded {
                return Some(self.burn_reason("impaired barrier", burn_rate));
            }
        }

        if self.policy.sensitive_skin_veto && user.is_sensitive() {
            if item.risk_flags.contains(&RiskFlag::HighIrritation) {
                return Some("sensitive skin: high irritation formula".to_owned());
            }
            if burn_exceeded {
                return Some(self.burn_reason("sensitive skin", burn_rate));
            }
        }

        None
    }

    fn burn_reason(&self, signal: &str, burn_rate: f64) -> String {
        format!(
            "{signal}: irritation reports {:.0}% exceed {:.0}%",
            burn_rate * 100.0,
            self.policy.veto_burn_rate * 100.0
        )
    }

    /// Inverse-priority weighted mechanism fit, 0-100; absent tracks count as zero
    pub fn science_score(&self, item: &Item, user: &UserProfile) -> (f64, Vec<MechanismTrack>) {
        if user.goals.is_empty() {
            return (NEUTRAL_SCIENCE, Vec::new());
        }

        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        let mut coverage = Vec::new();
        for goal in user.ranked_goals() {
            let weight = goal.weight();
            total_weight += weight;
            if let Some(score) = item.mechanism_scores.get(goal.track) {
                weighted += weight * score;
                coverage.push(goal.track);
            }
        }

        let science = if total_weight > 0.0 { weighted / total_weight * 100.0 } else { 0.0 };
        (science.clamp(0.0, 100.0), coverage)
    }

    /// Community reception discounted by the irritation-report rate, 0-100
    pub fn social_score(&self, item: &Item, user: &UserProfile) -> f64 {
        let scores: Vec<(f64, f64)> = item
            .social_stats
            .platform_scores
            .iter()
            .filter(|(_, score)| score.is_finite())
            .map(|(platform, score)| {
                let weight = user.platform_weights.get(platform).copied().unwrap_or(0.0);
                (score.clamp(0.0, 1.0), weight)
            })
            .collect();

        let reception = if scores.is_empty() {
            NEUTRAL_SOCIAL
        } else {
            let weight_sum: f64 = scores.iter().map(|(_, weight)| weight).sum();
            if weight_sum > 0.0 {
                scores.iter().map(|(score, weight)| score * weight).sum::<f64>() / weight_sum
            } else {
                // No overlap with the user's platforms
                scores.iter().map(|(score, _)| score).sum::<f64>() / scores.len() as f64
            }
        };

        (reception * 100.0 * (1.0 - item.social_stats.burn_rate())).clamp(0.0, 100.0)
    }

    /// Wear experience, 0-100
    pub fn engineering_score(&self, item: &Item, user: &UserProfile) -> f64 {
        let Some(experience) = &item.experience else {
            return NEUTRAL_ENGINEERING;
        };

        let pilling = unit(experience.pilling_risk);
        let stickiness = unit(experience.stickiness);
        let oily_leaning = user.has_skin_type(SkinType::Oily) || user.has_skin_type(SkinType::Combination);
        let texture_penalty = match experience.texture {
            Texture::Sticky => TEXTURE_PENALTY,
            Texture::Thick | Texture::Rich if oily_leaning => TEXTURE_PENALTY,
            _ => 0.0,
        };

        (100.0 - pilling * PILLING_PENALTY - stickiness * STICKINESS_PENALTY - texture_penalty)
            .clamp(0.0, 100.0)
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl FitScorer for DeterministicFitScorer {
    fn score(&self, item: &Item, user: &UserProfile) -> ScoreBreakdown {
        let (science, coverage) = self.science_score(item, user);
        let social = self.social_score(item, user);
        let engineering = self.engineering_score(item, user);
        let veto_reason = self.veto_reason(item, user);

        let weights = &self.policy.weights;
        let blended = (science * weights.science + social * weights.social + engineering * weights.engineering)
            / weights.sum();
        let no_signal = !user.goals.is_empty() && coverage.is_empty();
        let total = if veto_reason.is_some() || no_signal { 0.0 } else { blended.clamp(0.0, 100.0) };

        ScoreBreakdown {
            science,
            social,
            engineering,
            total,
            vetoed: veto_reason.is_some(),
            veto_reason,
            coverage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeterministicFitScorer, FitScorer, ScoringPolicy, ScoringWeights, NEUTRAL_ENGINEERING};
    use crate::domain::item::{
        Category, Experience, Item, MechanismScores, MechanismTrack, Platform, RiskFlag, Texture,
    };
    use crate::domain::profile::{BarrierStatus, Goal, SkinType, UserProfile};
    use crate::errors::DomainError;

    fn user(skin: &[SkinType], barrier: BarrierStatus, goals: Vec<Goal>) -> UserProfile {
        UserProfile::new(skin.iter().copied(), barrier, goals).expect("valid profile")
    }

    fn serum() -> Item {
        let mut item = Item::new("serum-1", "Clarifying Serum", Category::Serum);
        item.mechanism_scores = MechanismScores::default()
            .with(MechanismTrack::AcneComedonal, 0.8)
            .with(MechanismTrack::Brightening, 0.4);
        item
    }

    #[test]
    fn impaired_barrier_vetoes_acid() {
        let mut item = serum();
        item.risk_flags.insert(RiskFlag::Acid);
        let user = user(
            &[SkinType::Oily],
            BarrierStatus::Impaired,
            vec![Goal::new(MechanismTrack::AcneComedonal, 1)],
        );

        let score = DeterministicFitScorer::default().score(&item, &user);
        assert!(score.vetoed);
        assert_eq!(score.total, 0.0);
        assert_eq!(score.veto_reason.as_deref(), Some("impaired barrier: contains acid"));
        assert!(score.science > 0.0);
    }

    #[test]
    fn sensitive_skin_keeps_mild_acids_but_vetoes_high_irritation() {
        let sensitive = user(
            &[SkinType::Sensitive],
            BarrierStatus::Healthy,
            vec![Goal::new(MechanismTrack::AcneComedonal, 1)],
        );
        let scorer = DeterministicFitScorer::default();

        let mut mild = serum();
        mild.risk_flags.insert(RiskFlag::MildAcid);
        assert!(!scorer.score(&mild, &sensitive).vetoed);

        let mut strong = serum();
        strong.risk_flags.insert(RiskFlag::HighIrritation);
        assert!(scorer.score(&strong, &sensitive).vetoed);

        let mut burning = serum();
        burning.social_stats.burn_rate = 0.2;
        let reason = scorer.score(&burning, &sensitive).veto_reason;
        assert_eq!(reason.as_deref(), Some("sensitive skin: irritation reports 20% exceed 10%"));
    }

    #[test]
    fn sensitive_veto_can_be_disabled() {
        let policy = ScoringPolicy { sensitive_skin_veto: false, ..ScoringPolicy::default() };
        let scorer = DeterministicFitScorer::new(policy).expect("valid policy");
        let sensitive = user(&[SkinType::Sensitive], BarrierStatus::Healthy, Vec::new());

        let mut item = serum();
        item.risk_flags.insert(RiskFlag::HighIrritation);
        assert!(!scorer.score(&item, &sensitive).vetoed);
    }

    #[test]
    fn science_uses_inverse_priority_weights() {
        let user = user(
            &[SkinType::Oily],
            BarrierStatus::Healthy,
            vec![Goal::new(MechanismTrack::AcneComedonal, 1), Goal::new(MechanismTrack::Brightening, 2)],
        );
        let (science, coverage) = DeterministicFitScorer::default().science_score(&serum(), &user);

        // (1.0 * 0.8 + 0.5 * 0.4) / 1.5
        assert!((science - 66.666_666).abs() < 1e-3);
        assert_eq!(coverage, vec![MechanismTrack::AcneComedonal, MechanismTrack::Brightening]);
    }

    #[test]
    fn no_goal_coverage_zeroes_total() {
        let user =
            user(&[SkinType::Dry], BarrierStatus::Healthy, vec![Goal::new(MechanismTrack::Repair, 1)]);
        let score = DeterministicFitScorer::default().score(&serum(), &user);

        assert_eq!(score.total, 0.0);
        assert!(!score.vetoed);
        assert!(!score.is_eligible());
    }

    #[test]
    fn neutral_defaults_without_goals_social_or_experience() {
        let user = user(&[SkinType::Normal], BarrierStatus::Healthy, Vec::new());
        let score = DeterministicFitScorer::default().score(&serum(), &user);

        assert_eq!(score.science, 50.0);
        assert_eq!(score.social, 50.0);
        assert_eq!(score.engineering, NEUTRAL_ENGINEERING);
        assert!((score.total - 54.0).abs() < 1e-9);
    }

    #[test]
    fn social_weights_only_overlapping_platforms() {
        let mut item = serum();
        item.social_stats.platform_scores.insert(Platform::Reddit, 0.9);
        item.social_stats.platform_scores.insert(Platform::Tiktok, 0.3);
        item.social_stats.burn_rate = 0.1;
        let scorer = DeterministicFitScorer::default();

        let weighted = user(&[SkinType::Normal], BarrierStatus::Healthy, Vec::new())
            .with_platform_weight(Platform::Reddit, 1.0)
            .with_platform_weight(Platform::Red, 1.0);
        assert!((scorer.social_score(&item, &weighted) - 81.0).abs() < 1e-9);

        let unweighted = user(&[SkinType::Normal], BarrierStatus::Healthy, Vec::new());
        assert!((scorer.social_score(&item, &unweighted) - 54.0).abs() < 1e-9);
    }

    #[test]
    fn engineering_penalizes_heavy_textures_for_oily_skin() {
        let mut item = serum();
        item.experience = Some(Experience { texture: Texture::Rich, stickiness: 0.2, pilling_risk: 0.4 });
        let scorer = DeterministicFitScorer::default();

        let oily = user(&[SkinType::Oily], BarrierStatus::Healthy, Vec::new());
        let dry = user(&[SkinType::Dry], BarrierStatus::Healthy, Vec::new());
        assert!((scorer.engineering_score(&item, &oily) - 71.0).abs() < 1e-9);
        assert!((scorer.engineering_score(&item, &dry) - 81.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_weights() {
        let weights = ScoringWeights { science: 0.0, social: 0.0, engineering: 0.0 };
        let policy = ScoringPolicy { weights, ..ScoringPolicy::default() };
        assert!(matches!(DeterministicFitScorer::new(policy), Err(DomainError::InvalidWeight { .. })));

        let policy = ScoringPolicy { veto_burn_rate: 1.5, ..ScoringPolicy::default() };
        assert!(DeterministicFitScorer::new(policy).is_err());
    }
}
