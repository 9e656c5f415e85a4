use crate::types::{FundingType, Milestone};
use crate::units::NativeAmount;
use serde::{Deserialize, Serialize};

pub const FULL_PROJECT_MILESTONE: &str = "Full Project";

/// Milestones declared on-chain at campaign creation.
///
/// Crowdfunding releases once, when the goal is met or the 30-day deadline passes, so a
/// single milestone covers the whole goal. Treasury grant releases are governed by the
/// contract after approval, so none are declared up front.
pub fn resolve_milestones(funding_type: FundingType, funding_goal: NativeAmount) -> Vec<Milestone> {
    match funding_type {
        FundingType::Crowdfunding => vec![Milestone {
            description: FULL_PROJECT_MILESTONE.to_string(),
            amount: funding_goal,
        }],
        FundingType::TreasuryGrant => Vec::new(),
    }
}

/// One row of the staged grant release shown to applicants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantStage {
    pub label: String,
    pub percent: u8,
    pub amount: NativeAmount,
}

const GRANT_STAGES: [(&str, u8); 3] = [
    ("Proof of Concept or MVP", 30),
    ("Beta/Prototype Completed", 30),
    ("Final Product Launched", 40),
];

/// Informational 30/30/40 release breakdown for a treasury grant. Never submitted.
pub fn grant_release_schedule(funding_goal: NativeAmount) -> Vec<GrantStage> {
    let mut remaining = funding_goal;
    GRANT_STAGES
        .iter()
        .enumerate()
        .map(|(idx, (label, percent))| {
            // Last stage absorbs truncation so the stages always sum to the goal.
            let amount = if idx + 1 == GRANT_STAGES.len() {
                remaining
            } else {
                funding_goal.percent(*percent)
            };
            remaining = NativeAmount::from_base_units(
                remaining.base_units().saturating_sub(amount.base_units()),
            );
            GrantStage {
                label: label.to_string(),
                percent: *percent,
                amount,
            }
        })
        .collect()
}

/// What would be declared for the current draft, plus the displayed grant breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestonePreview {
    pub funding_type: FundingType,
    /// `None` while the goal text does not parse.
    pub funding_goal: Option<NativeAmount>,
    pub milestones: Vec<Milestone>,
    pub grant_schedule: Vec<GrantStage>,
}

pub fn preview(funding_type: FundingType, funding_goal: &str) -> MilestonePreview {
    let goal = NativeAmount::parse(funding_goal).ok();
    let (milestones, grant_schedule) = match (goal, funding_type) {
        (Some(goal), FundingType::TreasuryGrant) => {
            (resolve_milestones(funding_type, goal), grant_release_schedule(goal))
        }
        (Some(goal), FundingType::Crowdfunding) => (resolve_milestones(funding_type, goal), Vec::new()),
        (None, _) => (Vec::new(), Vec::new()),
    };
    MilestonePreview {
        funding_type,
        funding_goal: goal,
        milestones,
        grant_schedule,
    }
}
