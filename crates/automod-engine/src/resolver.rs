// resolver.rs — Field path resolution against the event context.
//
// Paths are parsed into a tagged `FieldPath` over a small fixed set of
// namespaces. `ai.*` goes to the content analyzer, `user.*` and `server.*`
// go to data access, and everything else walks the serialized context.
// Missing links and collaborator failures both come back as Unresolved.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;

use automod_policy::{Condition, ModerationContext, PolicyError, Resolved};

use crate::analyzer::{AnalysisResult, AnalyzeOptions, ContentAnalyzer};
use crate::data::DataAccess;
use crate::escalation::Judgment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiField {
    ToxicityFlagged,
    /// Max of the category scores.
    ToxicityScore,
    Spam,
    SentimentScore,
    Profanity,
    Nsfw,
    Language,
    Categories,
    Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Id,
    Roles,
    MessageCount,
    JoinDate,
    AccountAgeDays,
    Violations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerField {
    Id,
    MemberCount,
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    Ai(AiField),
    User(UserField),
    Server(ServerField),
    /// Plain lookup over the context's own fields.
    Context(Vec<String>),
    /// A reserved namespace with a sub-field nobody resolves.
    Unsupported(String),
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        let unsupported = || FieldPath::Unsupported(path.to_string());
        let Some((namespace, rest)) = path.split_once('.') else {
            return FieldPath::Context(vec![path.to_string()]);
        };
        match namespace {
            "ai" => match rest {
                "toxicity.flagged" => FieldPath::Ai(AiField::ToxicityFlagged),
                "toxicity.score" => FieldPath::Ai(AiField::ToxicityScore),
                "spam" => FieldPath::Ai(AiField::Spam),
                "sentiment.score" => FieldPath::Ai(AiField::SentimentScore),
                "profanity" => FieldPath::Ai(AiField::Profanity),
                "nsfw" => FieldPath::Ai(AiField::Nsfw),
                "language" => FieldPath::Ai(AiField::Language),
                "categories" => FieldPath::Ai(AiField::Categories),
                "confidence" => FieldPath::Ai(AiField::Confidence),
                _ => unsupported(),
            },
            "user" => match rest {
                "id" => FieldPath::User(UserField::Id),
                "roles" => FieldPath::User(UserField::Roles),
                "message_count" | "messageCount" => FieldPath::User(UserField::MessageCount),
                "join_date" | "joinDate" => FieldPath::User(UserField::JoinDate),
                "account_age_days" => FieldPath::User(UserField::AccountAgeDays),
                "violations" | "violation_count" => FieldPath::User(UserField::Violations),
                _ => unsupported(),
            },
            "server" => match rest {
                "id" => FieldPath::Server(ServerField::Id),
                "member_count" | "memberCount" => FieldPath::Server(ServerField::MemberCount),
                _ => unsupported(),
            },
            _ => FieldPath::Context(path.split('.').map(str::to_string).collect()),
        }
    }
}

/// Per-event resolution state. Holds the analyzer result so the analyzer is
/// called at most once per event, whatever number of policies and
/// conditions read `ai.*`. A failed call is cached as well.
///
/// The escalation judgment is held the same way: an event is one violation,
/// however many escalating policies match it.
pub struct EvaluationScope<'a> {
    ctx: &'a ModerationContext,
    analysis: OnceCell<Option<Arc<AnalysisResult>>>,
    pub(crate) judgment: OnceCell<Result<Option<Judgment>, String>>,
}

impl<'a> EvaluationScope<'a> {
    pub fn new(ctx: &'a ModerationContext) -> Self {
        Self {
            ctx,
            analysis: OnceCell::new(),
            judgment: OnceCell::new(),
        }
    }

    pub fn context(&self) -> &'a ModerationContext {
        self.ctx
    }
}

/// Resolves field paths using the injected collaborators.
pub struct ContextResolver {
    analyzer: Arc<dyn ContentAnalyzer>,
    data: Arc<dyn DataAccess>,
}

impl ContextResolver {
    pub fn new(analyzer: Arc<dyn ContentAnalyzer>, data: Arc<dyn DataAccess>) -> Self {
        Self { analyzer, data }
    }

    /// The event's analysis, fetching it on first use.
    pub async fn analysis(&self, scope: &EvaluationScope<'_>) -> Option<Arc<AnalysisResult>> {
        scope
            .analysis
            .get_or_init(|| async move {
                let ctx = scope.ctx;
                let options = AnalyzeOptions {
                    server_id: ctx.server_id.clone(),
                    channel_id: ctx.channel_id.clone(),
                };
                match self.analyzer.analyze(&ctx.content, &ctx.user_id, &options).await {
                    Ok(result) => Some(Arc::new(result)),
                    Err(e) => {
                        tracing::warn!(user_id = %ctx.user_id, error = %e, "content analysis failed");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    pub async fn resolve(&self, scope: &EvaluationScope<'_>, field: &str) -> Resolved {
        self.resolve_path(scope, &FieldPath::parse(field)).await
    }

    pub async fn resolve_path(&self, scope: &EvaluationScope<'_>, path: &FieldPath) -> Resolved {
        match path {
            FieldPath::Ai(field) => match self.analysis(scope).await {
                Some(analysis) => ai_value(&analysis, *field).into(),
                None => Resolved::Unresolved,
            },
            FieldPath::User(field) => self.user_value(scope.ctx, *field).await.into(),
            FieldPath::Server(field) => self.server_value(scope.ctx, *field).await.into(),
            FieldPath::Context(segments) => {
                let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
                scope.ctx.lookup(&segments).into()
            }
            FieldPath::Unsupported(path) => {
                tracing::debug!(field = %path, "unsupported reserved field");
                Resolved::Unresolved
            }
        }
    }

    /// Resolve and evaluate one condition.
    pub async fn evaluate(
        &self,
        scope: &EvaluationScope<'_>,
        condition: &Condition,
    ) -> Result<bool, PolicyError> {
        let resolved = self.resolve(scope, &condition.field).await;
        condition.evaluate(&resolved)
    }

    /// Evaluate conditions in order. Stops at the first malformed literal.
    pub async fn evaluate_all(
        &self,
        scope: &EvaluationScope<'_>,
        conditions: &[Condition],
    ) -> Result<Vec<bool>, PolicyError> {
        let mut results = Vec::with_capacity(conditions.len());
        for condition in conditions {
            results.push(self.evaluate(scope, condition).await?);
        }
        Ok(results)
    }

    async fn user_value(&self, ctx: &ModerationContext, field: UserField) -> Option<Value> {
        let server = ctx.server_id.as_deref();
        let user = ctx.user_id.as_str();
        let result = match field {
            UserField::Id => return Some(Value::from(ctx.user_id.clone())),
            UserField::Roles => return Some(Value::from(ctx.roles.clone())),
            UserField::MessageCount => self.data.user_message_count(user, server).await.map(Value::from),
            UserField::Violations => self.data.user_violation_count(user, server).await.map(Value::from),
            UserField::JoinDate => self
                .data
                .user_join_date(user, server)
                .await
                .map(|at| Value::from(at.to_rfc3339())),
            UserField::AccountAgeDays => self
                .data
                .user_join_date(user, server)
                .await
                .map(|at| Value::from((ctx.timestamp - at).num_days().max(0))),
        };
        result
            .map_err(|e| tracing::warn!(user_id = %user, field = ?field, error = %e, "user lookup failed"))
            .ok()
    }

    async fn server_value(&self, ctx: &ModerationContext, field: ServerField) -> Option<Value> {
        let server = ctx.server_id.as_deref()?;
        match field {
            ServerField::Id => Some(Value::from(server)),
            ServerField::MemberCount => self
                .data
                .server_member_count(server)
                .await
                .map(Value::from)
                .map_err(|e| tracing::warn!(server_id = %server, error = %e, "member count lookup failed"))
                .ok(),
        }
    }
}

fn ai_value(analysis: &AnalysisResult, field: AiField) -> Option<Value> {
    Some(match field {
        AiField::ToxicityFlagged => Value::from(analysis.toxicity.flagged),
        AiField::ToxicityScore => Value::from(analysis.toxicity.max_score()),
        AiField::Spam => Value::from(analysis.spam),
        AiField::SentimentScore => Value::from(analysis.sentiment.score),
        AiField::Profanity => Value::from(analysis.profanity),
        AiField::Nsfw => Value::from(analysis.nsfw),
        AiField::Language => Value::from(analysis.language.clone()?),
        AiField::Categories => Value::from(analysis.categories.clone()),
        AiField::Confidence => Value::from(analysis.confidence),
    })
}
