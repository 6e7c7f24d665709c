/// Errors raised while resolving a device's effective configuration.
///
/// A resolution error is scoped to the template (or device) that caused it;
/// callers collect it and keep resolving everything else.
///
/// # Examples
///
/// ```rust
/// use hmon_template::error::ResolveError;
///
/// let err = ResolveError::Cycle {
///     template_id: "tpl-a".to_string(),
/// };
/// assert!(err.to_string().contains("tpl-a"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The parent walk revisited a template.
    #[error("template inheritance cycle detected at template {template_id}")]
    Cycle { template_id: String },

    /// The parent walk went deeper than the allowed number of hops.
    #[error("template inheritance depth exceeds {max} starting from template {template_id}")]
    DepthExceeded { template_id: String, max: usize },

    /// The template being resolved does not exist.
    #[error("template {0} not found")]
    TemplateNotFound(String),

    #[error("device {0} not found")]
    DeviceNotFound(String),
}

pub type Result<T> = std::result::Result<T, ResolveError>;
