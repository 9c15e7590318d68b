use std::collections::HashMap;
use std::sync::Arc;

use docpipe_core::{
    CapabilityKind, ModelConfig, ModelInstance, ModelLoader, PipelineError, Result,
};

use crate::detect::BlockDetector;
use crate::preprocess::DocumentCleaner;
use crate::rules::{invoice_field_rules, RegexRuleModel};

/// What to do when `load_model` names a model the catalog doesn't know.
///
/// The original services silently installed a no-op entry, which masked
/// configuration typos for whole runs. Strict is the default; the old
/// behavior is opt-in and loudly logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownModelPolicy {
    #[default]
    Strict,
    Skeleton,
}

type Builder = Arc<dyn Fn(&ModelConfig) -> Result<ModelInstance> + Send + Sync>;

/// Resolves model names to capability builders for one stage.
pub struct ModelCatalog {
    kind: CapabilityKind,
    policy: UnknownModelPolicy,
    builders: HashMap<String, Builder>,
}

impl ModelCatalog {
    /// Catalog with the built-in backends for the given capability kind.
    ///
    /// Recognition ships no built-ins — OCR backends are deployment-specific
    /// and get registered by the embedding application.
    pub fn new(kind: CapabilityKind, policy: UnknownModelPolicy) -> Self {
        let mut catalog = Self {
            kind,
            policy,
            builders: HashMap::new(),
        };

        match kind {
            CapabilityKind::Detection => {
                catalog.register("default_binarize", |_| {
                    Ok(ModelInstance::Detection(Box::new(DocumentCleaner::new())))
                });
                catalog.register("block_detect_v1", |config| {
                    Ok(ModelInstance::Detection(Box::new(BlockDetector::from_config(config))))
                });
            }
            CapabilityKind::Recognition => {}
            CapabilityKind::Rule => {
                catalog.register("invoice_fields_v1", |config| {
                    let rules = if config.rules.is_empty() {
                        invoice_field_rules()
                    } else {
                        config.rules.clone()
                    };
                    Ok(ModelInstance::Rule(Box::new(RegexRuleModel::compile(&rules)?)))
                });
            }
        }

        catalog
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: impl Fn(&ModelConfig) -> Result<ModelInstance> + Send + Sync + 'static,
    ) {
        self.builders.insert(name.into(), Arc::new(builder));
    }
}

impl ModelLoader for ModelCatalog {
    fn build(&self, name: &str, config: &ModelConfig) -> Result<ModelInstance> {
        if let Some(builder) = self.builders.get(name) {
            let instance = builder(config)?;
            if instance.kind() != self.kind {
                return Err(PipelineError::LoadError(format!(
                    "model {name} built as {} but this stage hosts {} models",
                    instance.kind().as_str(),
                    self.kind.as_str()
                )));
            }
            return Ok(instance);
        }

        // Rule models can be defined entirely by the load config.
        if self.kind == CapabilityKind::Rule && !config.rules.is_empty() {
            return Ok(ModelInstance::Rule(Box::new(RegexRuleModel::compile(&config.rules)?)));
        }

        match self.policy {
            UnknownModelPolicy::Strict => Err(PipelineError::UnknownModel(name.to_string())),
            UnknownModelPolicy::Skeleton => {
                tracing::warn!(
                    model = name,
                    kind = self.kind.as_str(),
                    "unknown model name, installing skeleton instance"
                );
                Ok(ModelInstance::Skeleton { kind: self.kind })
            }
        }
    }
}
