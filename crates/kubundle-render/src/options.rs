//! Render options

use std::fmt;
use std::sync::Arc;

use kubundle_core::naming::object_name_for_base_and_suffix;
use kubundle_core::{DeploymentConfig, InstallModeSet, InstallModeType};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::certificate::CertificateProvider;
use crate::error::{RenderError, Result};
use crate::resources::Proxy;

/// Target namespaces meaning "every namespace"
pub const ALL_NAMESPACES: &[String] = &[String::new()];

/// Length of the hash suffix produced by [`default_unique_name_generator`]
const NAME_HASH_LENGTH: usize = 16;

/// Derives a stable, collision-resistant name from a base and its content
///
/// Equal inputs must produce equal names.
pub type UniqueNameGenerator = Arc<dyn Fn(&str, &JsonValue) -> Result<String> + Send + Sync>;

/// `base` followed by a short content hash, capped at 63 characters
pub fn default_unique_name_generator(base: &str, content: &JsonValue) -> Result<String> {
    let bytes = serde_json::to_vec(content).map_err(|e| RenderError::NameGeneration {
        base: base.to_string(),
        message: e.to_string(),
    })?;

    let digest = hex::encode(Sha256::digest(&bytes));
    Ok(object_name_for_base_and_suffix(base, &digest[..NAME_HASH_LENGTH]))
}

/// Options controlling a single render
#[derive(Clone)]
pub struct RenderOptions {
    /// Namespace the bundle is installed into
    pub install_namespace: String,

    /// Namespaces the operator watches; `None` means all namespaces
    pub target_namespaces: Option<Vec<String>>,

    /// Issues webhook serving certificates
    pub certificate_provider: Option<Arc<dyn CertificateProvider>>,

    /// Names Roles and ClusterRoles
    pub unique_name_generator: UniqueNameGenerator,

    /// Overrides applied to every generated Deployment
    pub deployment_config: Option<DeploymentConfig>,

    /// Raw user configuration (YAML or JSON), validated against the bundle schema
    pub raw_config: Option<Vec<u8>>,

    /// Proxy environment injected into every generated Deployment
    pub proxy: Option<Proxy>,
}

impl RenderOptions {
    pub fn new(install_namespace: impl Into<String>) -> Self {
        Self {
            install_namespace: install_namespace.into(),
            target_namespaces: None,
            certificate_provider: None,
            unique_name_generator: Arc::new(default_unique_name_generator),
            deployment_config: None,
            raw_config: None,
            proxy: None,
        }
    }

    pub fn with_target_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_namespaces = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_certificate_provider(mut self, provider: Arc<dyn CertificateProvider>) -> Self {
        self.certificate_provider = Some(provider);
        self
    }

    pub fn with_unique_name_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&str, &JsonValue) -> Result<String> + Send + Sync + 'static,
    {
        self.unique_name_generator = Arc::new(generator);
        self
    }

    pub fn with_deployment_config(mut self, config: DeploymentConfig) -> Self {
        self.deployment_config = Some(config);
        self
    }

    pub fn with_config(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.raw_config = Some(raw.into());
        self
    }

    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Effective target namespaces, `[""]` unless set
    pub fn target_namespaces(&self) -> &[String] {
        self.target_namespaces.as_deref().unwrap_or(ALL_NAMESPACES)
    }

    /// True when targeting is exactly `[""]`
    pub fn is_all_namespaces(&self) -> bool {
        matches!(self.target_namespaces(), [ns] if ns.is_empty())
    }

    pub fn certificate_provider(&self) -> Option<&dyn CertificateProvider> {
        self.certificate_provider.as_deref()
    }

    pub fn unique_name(&self, base: &str, content: &JsonValue) -> Result<String> {
        (self.unique_name_generator)(base, content)
    }

    /// Check the options against the install modes a bundle supports
    ///
    /// Returns every problem found, empty when the options are usable.
    pub fn validate(&self, modes: &InstallModeSet) -> Vec<String> {
        let targets = self.target_namespaces();
        let mut errors = Vec::new();

        if targets.is_empty() {
            errors.push("at least one target namespace must be specified".to_string());
        }

        if let Err(e) = validate_target_namespaces(modes, &self.install_namespace, targets) {
            errors.push(format!(
                "invalid target namespaces {}: {e}",
                format_list(targets)
            ));
        }

        errors
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("install_namespace", &self.install_namespace)
            .field("target_namespaces", &self.target_namespaces)
            .field("certificate_provider", &self.certificate_provider.is_some())
            .field("deployment_config", &self.deployment_config)
            .field("raw_config", &self.raw_config.as_ref().map(Vec::len))
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

/// Render a list the way `[a b c]` status messages expect
fn format_list(items: &[String]) -> String {
    format!("[{}]", items.join(" "))
}

fn validate_target_namespaces(
    modes: &InstallModeSet,
    install_namespace: &str,
    targets: &[String],
) -> std::result::Result<(), String> {
    let mut unique: Vec<&str> = targets.iter().map(String::as_str).collect();
    unique.sort_unstable();
    unique.dedup();

    match unique.as_slice() {
        [] | [""] => {
            if modes.supports(InstallModeType::AllNamespaces) {
                return Ok(());
            }
            return Err(format!(
                "supported install modes {modes} do not support targeting all namespaces"
            ));
        }
        [namespace] => {
            if modes.supports(InstallModeType::SingleNamespace) {
                return Ok(());
            }
            if modes.supports(InstallModeType::OwnNamespace) && *namespace == install_namespace {
                return Ok(());
            }
        }
        _ => {
            if modes.supports(InstallModeType::MultiNamespace) && !unique.contains(&"") {
                return Ok(());
            }
        }
    }

    Err(format!(
        "supported install modes {modes} do not support target namespaces {}",
        format_list(targets)
    ))
}
