use curtain_core::{Holding, SlotKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Decides which of a user's existing holdings a new holding replaces.
pub trait HoldPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `existing` is released before the user holds seats in `slot`.
    fn supersedes(&self, existing: &Holding, slot: &SlotKey) -> bool;
}

/// One active holding per user: any earlier holding is released first.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleActiveHold;

impl HoldPolicy for SingleActiveHold {
    fn name(&self) -> &'static str {
        "single_active"
    }

    fn supersedes(&self, _existing: &Holding, _slot: &SlotKey) -> bool {
        true
    }
}

/// Users may keep several holdings; their own seats still conflict.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowMultipleHolds;

impl HoldPolicy for AllowMultipleHolds {
    fn name(&self) -> &'static str {
        "allow_multiple"
    }

    fn supersedes(&self, _existing: &Holding, _slot: &SlotKey) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HoldPolicyKind {
    #[default]
    SingleActive,
    AllowMultiple,
}

impl HoldPolicyKind {
    pub fn build(self) -> Arc<dyn HoldPolicy> {
        match self {
            HoldPolicyKind::SingleActive => Arc::new(SingleActiveHold),
            HoldPolicyKind::AllowMultiple => Arc::new(AllowMultipleHolds),
        }
    }
}

impl std::str::FromStr for HoldPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "single_active" => Ok(HoldPolicyKind::SingleActive),
            "allow_multiple" => Ok(HoldPolicyKind::AllowMultiple),
            other => Err(format!("unknown hold policy: {}", other)),
        }
    }
}
