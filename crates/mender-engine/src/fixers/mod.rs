//! Fixers: a closed set of strategies tried in a fixed order.
//!
//! Security, static-type, and component fixers each claim a class of issue;
//! anything unclaimed goes to the generic escalating fixer. All of them go
//! through the same oracle call path and acceptance gate.

pub mod autofix;
mod component;
pub mod gate;
mod generic;
mod security;
mod static_type;

use crate::cost::CostGovernor;
use crate::oracle::{apply_edits, interpret_reply, ModelCatalog, ModelTier, ReplyVerdict};
use mender_core::fix_loop::AttemptPlan;
use mender_core::{FixError, Issue, Oracle, OracleRequest, Strategy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// What one attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FixResult {
    pub fixed_content: Option<String>,
    pub cost_usd: f64,
    pub model: String,
    pub reasoning: String,
    pub error: Option<FixError>,
}

impl FixResult {
    pub fn fixed(content: String, cost_usd: f64, model: &str, reasoning: String) -> Self {
        Self {
            fixed_content: Some(content),
            cost_usd,
            model: model.to_string(),
            reasoning,
            error: None,
        }
    }

    pub fn failed(error: FixError, cost_usd: f64, model: &str) -> Self {
        Self {
            fixed_content: None,
            cost_usd,
            model: model.to_string(),
            reasoning: error.to_string(),
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && self.fixed_content.is_some()
    }
}

/// Everything a fixer needs besides the issue and the file.
pub struct FixContext<'a> {
    pub oracle: &'a dyn Oracle,
    pub governor: &'a mut CostGovernor,
    pub models: &'a ModelCatalog,
    pub oracle_timeout: Duration,
    pub cancel: &'a AtomicBool,
}

/// One oracle request, before pricing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OracleCall {
    pub tier: ModelTier,
    pub temperature: f32,
    pub system: String,
    pub user: String,
    /// Security-sensitive candidates get the stricter gate
    pub strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fixer {
    Security,
    StaticType,
    ComponentFramework,
    Generic,
}

impl Fixer {
    pub const ORDER: [Fixer; 4] = [
        Fixer::Security,
        Fixer::StaticType,
        Fixer::ComponentFramework,
        Fixer::Generic,
    ];

    /// First fixer in priority order that claims the issue.
    pub fn select(issue: &Issue) -> Fixer {
        Self::ORDER
            .into_iter()
            .find(|fixer| fixer.can_fix(issue))
            .unwrap_or(Fixer::Generic)
    }

    pub fn can_fix(&self, issue: &Issue) -> bool {
        match self {
            Fixer::Security => security::claims(issue),
            Fixer::StaticType => static_type::claims(issue),
            Fixer::ComponentFramework => component::claims(issue),
            Fixer::Generic => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Fixer::Security => "security",
            Fixer::StaticType => "static_type",
            Fixer::ComponentFramework => "component",
            Fixer::Generic => "generic",
        }
    }

    /// Security and component fixers make exactly one strong attempt.
    pub fn max_attempts(&self, max_retries: u32) -> u32 {
        match self {
            Fixer::Security | Fixer::ComponentFramework => 1,
            Fixer::StaticType | Fixer::Generic => max_retries.max(1),
        }
    }

    /// Whether the ladder (and a learned starting rung) applies.
    pub fn escalates(&self) -> bool {
        matches!(self, Fixer::StaticType | Fixer::Generic)
    }

    /// The strategy an attempt is recorded under.
    pub fn strategy_for(&self, plan: AttemptPlan) -> Strategy {
        if self.escalates() {
            plan.strategy
        } else {
            Strategy::Specialized
        }
    }

    fn oracle_call(&self, issue: &Issue, content: &str, strategy: Strategy) -> OracleCall {
        match self {
            Fixer::Security => security::call(issue, content),
            Fixer::StaticType => static_type::call(issue, content, strategy),
            Fixer::ComponentFramework => component::call(issue, content),
            Fixer::Generic => generic::call(issue, content, strategy),
        }
    }

    /// Ask the oracle for a candidate and run it through the gate. Never
    /// touches the working tree.
    pub async fn fix(
        &self,
        ctx: &mut FixContext<'_>,
        issue: &Issue,
        content: &str,
        plan: AttemptPlan,
    ) -> FixResult {
        let call = self.oracle_call(issue, content, self.strategy_for(plan));
        request_fix(ctx, call, content).await
    }
}

pub(crate) async fn request_fix(
    ctx: &mut FixContext<'_>,
    call: OracleCall,
    original: &str,
) -> FixResult {
    let model = ctx.models.id(call.tier).to_string();
    if ctx.cancel.load(Ordering::SeqCst) {
        return FixResult::failed(FixError::Cancelled, 0.0, &model);
    }

    let input_tokens = ctx.governor.estimate_tokens(&call.system)
        + ctx.governor.estimate_tokens(&call.user);
    if let Err(err) = ctx.governor.check(input_tokens, &model) {
        tracing::info!(model = %model, error = %err, "oracle call refused by budget");
        return FixResult::failed(err, 0.0, &model);
    }

    let request = OracleRequest {
        model: model.clone(),
        system: call.system,
        user: call.user,
        temperature: call.temperature,
        max_tokens: call.tier.max_tokens(),
    };
    let reply = match tokio::time::timeout(ctx.oracle_timeout, ctx.oracle.complete(request)).await
    {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            return FixResult::failed(FixError::Oracle(format!("{:#}", err)), 0.0, &model);
        }
        Err(_) => {
            return FixResult::failed(
                FixError::Timeout(ctx.oracle_timeout.as_secs()),
                0.0,
                &model,
            );
        }
    };

    let (input, output) = match reply.usage {
        Some(usage) => (usage.input_tokens, usage.output_tokens),
        None => (input_tokens, ctx.governor.estimate_tokens(&reply.content)),
    };
    let cost = ctx.governor.record(input, output, &model);
    tracing::debug!(model = %model, cost_usd = cost, input, output, "oracle replied");

    let verdict = match interpret_reply(&reply.content) {
        Ok(verdict) => verdict,
        Err(err) => {
            return FixResult::failed(FixError::Oracle(err.to_string()), cost, &model);
        }
    };
    let (edits, reasoning) = match verdict {
        ReplyVerdict::Edits { edits, reasoning } => (edits, reasoning),
        ReplyVerdict::NeedsReview(reason) => {
            return FixResult::failed(FixError::NeedsReview(reason), cost, &model);
        }
        ReplyVerdict::Declined(reason) => {
            return FixResult::failed(FixError::Declined(reason), cost, &model);
        }
    };

    let candidate = match apply_edits(original, &edits) {
        Ok(candidate) => candidate,
        Err(err) => return FixResult::failed(FixError::Oracle(err), cost, &model),
    };
    let gated = gate::check_candidate(original, &candidate).and_then(|()| {
        if call.strict {
            gate::check_security_candidate(original, &candidate)
        } else {
            Ok(())
        }
    });
    if let Err(err) = gated {
        return FixResult::failed(err, cost, &model);
    }

    FixResult::fixed(candidate, cost, &model, reasoning)
}
