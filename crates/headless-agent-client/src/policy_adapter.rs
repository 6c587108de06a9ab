use platform_core::PolicyName;
use poker_domain::{ActionKind, Chips, YourTurn};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// What a `yourTurn` notification tells the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnContext {
    pub legal_actions: Vec<ActionKind>,
    pub call_amount: Chips,
    pub min_raise: Chips,
}

impl TurnContext {
    #[must_use]
    pub fn allows(&self, kind: ActionKind) -> bool {
        self.legal_actions.contains(&kind)
    }

    fn call(&self, note: &str) -> Decision {
        Decision {
            kind: ActionKind::Call,
            amount: self.call_amount,
            note: note.to_string(),
        }
    }

    /// Call when the service allows it, otherwise fold.
    fn call_or_fold(&self, note: &str) -> Decision {
        if self.allows(ActionKind::Call) {
            self.call(note)
        } else {
            Decision::fold("call unavailable")
        }
    }
}

impl From<&YourTurn> for TurnContext {
    fn from(turn: &YourTurn) -> Self {
        Self {
            legal_actions: turn.available_actions.clone(),
            call_amount: turn.call_amount,
            min_raise: turn.min_raise,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: ActionKind,
    pub amount: Chips,
    pub note: String,
}

impl Decision {
    fn fold(note: &str) -> Self {
        Self {
            kind: ActionKind::Fold,
            amount: Chips::ZERO,
            note: note.to_string(),
        }
    }
}

/// Pure decision function of (turn context, random draw).
pub trait Policy {
    fn decide<R: Rng + ?Sized>(&self, ctx: &TurnContext, rng: &mut R) -> Decision;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggressive {
    pub raise_probability: f64,
    pub call_probability: f64,
    pub raise_jitter: u64,
}

impl Default for Aggressive {
    fn default() -> Self {
        Self {
            raise_probability: 0.7,
            call_probability: 0.3,
            raise_jitter: 50,
        }
    }
}

impl Policy for Aggressive {
    fn decide<R: Rng + ?Sized>(&self, ctx: &TurnContext, rng: &mut R) -> Decision {
        if rng.random::<f64>() < self.raise_probability {
            if !ctx.allows(ActionKind::Raise) {
                return ctx.call_or_fold("raise unavailable");
            }
            let offset = if self.raise_jitter == 0 {
                0
            } else {
                rng.random_range(0..self.raise_jitter)
            };
            return Decision {
                kind: ActionKind::Raise,
                amount: Chips(ctx.min_raise.as_u64().saturating_add(offset)),
                note: "aggressive raise".to_string(),
            };
        }
        if rng.random::<f64>() < self.call_probability {
            ctx.call_or_fold("aggressive call")
        } else {
            Decision::fold("aggressive fold")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conservative {
    pub small_call_limit: Chips,
    pub small_call_probability: f64,
    pub large_call_probability: f64,
}

impl Default for Conservative {
    fn default() -> Self {
        Self {
            small_call_limit: Chips(30),
            small_call_probability: 0.6,
            large_call_probability: 0.2,
        }
    }
}

impl Policy for Conservative {
    fn decide<R: Rng + ?Sized>(&self, ctx: &TurnContext, rng: &mut R) -> Decision {
        if ctx.call_amount.is_zero() {
            return ctx.call_or_fold("check");
        }
        let probability = if ctx.call_amount <= self.small_call_limit {
            self.small_call_probability
        } else {
            self.large_call_probability
        };
        if rng.random::<f64>() < probability {
            ctx.call_or_fold("conservative call")
        } else {
            Decision::fold("conservative fold")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolicyKind {
    Aggressive(Aggressive),
    Conservative(Conservative),
}

impl PolicyKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aggressive(_) => "aggressive",
            Self::Conservative(_) => "conservative",
        }
    }
}

impl From<PolicyName> for PolicyKind {
    fn from(name: PolicyName) -> Self {
        match name {
            PolicyName::Aggressive => Self::Aggressive(Aggressive::default()),
            PolicyName::Conservative => Self::Conservative(Conservative::default()),
        }
    }
}

impl Policy for PolicyKind {
    fn decide<R: Rng + ?Sized>(&self, ctx: &TurnContext, rng: &mut R) -> Decision {
        match self {
            Self::Aggressive(policy) => policy.decide(ctx, rng),
            Self::Conservative(policy) => policy.decide(ctx, rng),
        }
    }
}
