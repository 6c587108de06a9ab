use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Action kinds a player can send. A check travels as a call of amount 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Fold,
    #[serde(alias = "check")]
    Call,
    Raise,
    AllIn,
}

impl ActionKind {
    pub const ALL: [Self; 4] = [Self::Fold, Self::Call, Self::Raise, Self::AllIn];

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fold" => Some(Self::Fold),
            "call" | "check" => Some(Self::Call),
            "raise" | "bet" => Some(Self::Raise),
            "allin" | "all_in" | "all-in" => Some(Self::AllIn),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fold => "fold",
            Self::Call => "call",
            Self::Raise => "raise",
            Self::AllIn => "allIn",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes `availableActions`, dropping names the harness does not know and
/// collapsing duplicates (`check` and `call` both map to `Call`).
pub fn deserialize_legal_actions<'de, D>(deserializer: D) -> Result<Vec<ActionKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    let mut kinds = Vec::with_capacity(raw.len());
    for kind in raw.iter().filter_map(|name| ActionKind::parse(name)) {
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}
