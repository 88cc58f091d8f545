//! Stage runner: one completion call per stage, with model fallback and a
//! deployment-wide failure policy.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use pipeline::{
    BrandIdentity, Completion, CompletionProvider, CompletionRequest, ModelId, ProviderError,
    RetryPolicy, StageDefinition, StageOutput,
};

use crate::demo::demo_output;
use crate::prompts::{system_prompt, user_message};
use crate::Notice;

/// What the runner does when the provider cannot produce output.
///
/// Chosen once per deployment; the two behaviours are never mixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Substitute the stage's demo output and raise a notice.
    #[default]
    Fallback,
    /// Return the provider error; the stage does not advance.
    Strict,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fallback" => Ok(FailurePolicy::Fallback),
            "strict" => Ok(FailurePolicy::Strict),
            other => Err(format!("unknown failure policy '{other}'")),
        }
    }
}

/// Output of one stage run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerOutput {
    /// Output to attach to the run.
    pub output: StageOutput,
    /// Fallbacks that happened along the way.
    pub notices: Vec<Notice>,
}

/// Executes single stages against a [`CompletionProvider`].
#[derive(Debug, Clone)]
pub struct StageRunner<P> {
    provider: P,
    policy: FailurePolicy,
    fallback_model: Option<ModelId>,
}

impl<P: CompletionProvider> StageRunner<P> {
    /// Creates a runner with the given failure policy and no fallback model.
    pub fn new(provider: P, policy: FailurePolicy) -> Self {
        Self {
            provider,
            policy,
            fallback_model: None,
        }
    }

    /// Sets the model tried once when the preferred model fails.
    pub fn with_fallback_model(mut self, model: ModelId) -> Self {
        self.fallback_model = Some(model);
        self
    }

    /// Runs one stage with `context` as input.
    ///
    /// # Errors
    ///
    /// Only under [`FailurePolicy::Strict`]: the last provider failure.
    #[instrument(skip(self, context, brand), fields(stage = %stage.id, model = %stage.preferred_model, provider = self.provider.name()))]
    pub async fn run(
        &self,
        stage: &StageDefinition,
        context: &str,
        brand: Option<&BrandIdentity>,
    ) -> Result<RunnerOutput, ProviderError> {
        let request = CompletionRequest {
            model: stage.preferred_model.clone(),
            system: system_prompt(stage.id).to_string(),
            user: user_message(stage.id, context, brand),
        };
        let mut notices = Vec::new();

        let error = match self.attempt(&request).await {
            Ok(completion) => {
                info!(used = %completion.model, chars = completion.text.len(), "Stage output generated");
                return Ok(RunnerOutput {
                    output: StageOutput::generated(completion.text, completion.model, context),
                    notices,
                });
            }
            Err(error) => error,
        };

        let error = match self.fallback_target(&request.model, &error) {
            Some(model) => {
                warn!(error = %error, fallback = %model, "Preferred model failed; trying fallback model");
                let retry = CompletionRequest {
                    model: model.clone(),
                    ..request.clone()
                };
                match self.attempt(&retry).await {
                    Ok(completion) => {
                        notices.push(Notice::ModelFallback {
                            stage: stage.id,
                            requested: request.model,
                            used: completion.model.clone(),
                            reason: error.to_string(),
                        });
                        return Ok(RunnerOutput {
                            output: StageOutput::generated(completion.text, completion.model, context),
                            notices,
                        });
                    }
                    Err(second) => second,
                }
            }
            None => error,
        };

        match self.policy {
            FailurePolicy::Strict => {
                warn!(error = %error, "Stage failed under strict policy");
                Err(error)
            }
            FailurePolicy::Fallback => {
                warn!(error = %error, "Stage failed; substituting demo output");
                notices.push(Notice::DemoOutput {
                    stage: stage.id,
                    reason: error.to_string(),
                });
                Ok(RunnerOutput {
                    output: StageOutput::fallback(demo_output(stage.id), context),
                    notices,
                })
            }
        }
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let completion = self.provider.complete(request).await?;
        if completion.text.trim().is_empty() {
            return Err(ProviderError::Malformed {
                message: "completion text is empty".to_string(),
            });
        }
        Ok(completion)
    }

    fn fallback_target(&self, requested: &ModelId, error: &ProviderError) -> Option<&ModelId> {
        if error.retry_policy() != RetryPolicy::Retryable {
            return None;
        }
        self.fallback_model.as_ref().filter(|m| *m != requested)
    }
}
