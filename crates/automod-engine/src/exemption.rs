// exemption.rs — Exemption checks, run before a policy's conditions.
//
// Any single matching exemption disables the policy for the event, so the
// analyzer is never consulted for exempt users unless a condition-set
// exemption itself reads `ai.*`.

use std::sync::Arc;

use automod_policy::{Exemption, PolicyError};

use crate::resolver::{ContextResolver, EvaluationScope};

pub struct ExemptionFilter {
    resolver: Arc<ContextResolver>,
}

impl ExemptionFilter {
    pub fn new(resolver: Arc<ContextResolver>) -> Self {
        Self { resolver }
    }

    /// The first exemption that applies to this event, if any.
    pub async fn first_match<'e>(
        &self,
        scope: &EvaluationScope<'_>,
        exemptions: &'e [Exemption],
    ) -> Result<Option<&'e Exemption>, PolicyError> {
        for exemption in exemptions {
            if self.applies(scope, exemption).await? {
                return Ok(Some(exemption));
            }
        }
        Ok(None)
    }

    pub async fn is_exempt(
        &self,
        scope: &EvaluationScope<'_>,
        exemptions: &[Exemption],
    ) -> Result<bool, PolicyError> {
        Ok(self.first_match(scope, exemptions).await?.is_some())
    }

    async fn applies(
        &self,
        scope: &EvaluationScope<'_>,
        exemption: &Exemption,
    ) -> Result<bool, PolicyError> {
        let ctx = scope.context();
        Ok(match exemption {
            Exemption::User { user_ids } => user_ids.contains(&ctx.user_id),
            Exemption::Role { role_ids } => ctx.roles.iter().any(|r| role_ids.contains(r)),
            Exemption::Channel { channel_ids } => ctx
                .channel_id
                .as_ref()
                .is_some_and(|c| channel_ids.contains(c)),
            Exemption::TimeRange { start, end } => *start <= ctx.timestamp && ctx.timestamp <= *end,
            Exemption::ConditionSet { conditions } => {
                if conditions.is_empty() {
                    return Ok(false);
                }
                for condition in conditions {
                    if !self.resolver.evaluate(scope, condition).await? {
                        return Ok(false);
                    }
                }
                true
            }
        })
    }
}
