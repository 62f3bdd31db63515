//! Form definition loader.
//!
//! Reads one form per `.toml` or `.json` file from a single file or a
//! directory tree (visited in sorted order), builds validated [`Form`]
//! values, and compiles every policy, pattern and template up front so a
//! broken definition stops startup instead of failing a live request.

mod dto;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cap_std::{ambient_authority, fs::Dir};
use thiserror::Error;
use tracing::debug;
use url::Url;

use self::dto::{AmqpDto, FieldDto, FormDto, WebhookDto};
use crate::domain::form::{
    AccessPolicy, BrokerTarget, Field, FieldPattern, Form, FormParts, FormValidationError,
    NotificationTarget, RetryPolicy, WebhookTarget,
};
use crate::domain::ports::{TemplateError, TemplateRenderer};
use crate::outbound::policy::{PolicyCompileError, RhaiPolicyEngine};

/// Reasons a definition set is rejected.
#[derive(Debug, Error)]
pub enum FormLoadError {
    /// A file or directory could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// A file is not valid TOML or JSON for the schema.
    #[error("failed to parse {}: {message}", .path.display())]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// The definition breaks a form invariant.
    #[error("{}: {source}", .path.display())]
    Invalid {
        /// Offending path.
        path: PathBuf,
        /// Violated invariant.
        source: FormValidationError,
    },
    /// A field pattern is not a valid regular expression.
    #[error("{}: field `{field}` has an invalid pattern: {message}", .path.display())]
    Pattern {
        /// Offending path.
        path: PathBuf,
        /// Field carrying the pattern.
        field: String,
        /// Regex error.
        message: String,
    },
    /// The admission policy does not parse.
    #[error("{}: {source}", .path.display())]
    Policy {
        /// Offending path.
        path: PathBuf,
        /// Parser error.
        source: PolicyCompileError,
    },
    /// A webhook URL or method is malformed.
    #[error("{}: invalid webhook `{value}`: {message}", .path.display())]
    Webhook {
        /// Offending path.
        path: PathBuf,
        /// URL or method as written.
        value: String,
        /// What is wrong with it.
        message: String,
    },
    /// A template does not compile.
    #[error("{}: form `{form}`: {source}", .path.display())]
    Template {
        /// Offending path.
        path: PathBuf,
        /// Form owning the template.
        form: String,
        /// Compiler error.
        source: TemplateError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Builds forms from definition files.
pub struct FormLoader<'a> {
    renderer: &'a dyn TemplateRenderer,
    policies: RhaiPolicyEngine,
}

impl<'a> FormLoader<'a> {
    /// Loader compiling templates with `renderer`.
    pub fn new(renderer: &'a dyn TemplateRenderer) -> Self {
        Self {
            renderer,
            policies: RhaiPolicyEngine::new(),
        }
    }

    /// Load every definition under `path`, which may be a file or a
    /// directory.
    pub fn load(&self, path: &Path) -> Result<Vec<Form>, FormLoadError> {
        let io_error = |source| FormLoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        if path.is_dir() {
            let root = Dir::open_ambient_dir(path, ambient_authority()).map_err(io_error)?;
            let mut files = Vec::new();
            collect_definitions(&root, Path::new(""), &mut files).map_err(io_error)?;
            files
                .iter()
                .map(|relative| {
                    let source = root
                        .read_to_string(relative)
                        .map_err(|source| FormLoadError::Io {
                            path: path.join(relative),
                            source,
                        })?;
                    self.parse(&path.join(relative), &source)
                })
                .collect()
        } else {
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_error)?;
            let name = path.file_name().map(Path::new).unwrap_or(path);
            let source = dir.read_to_string(name).map_err(io_error)?;
            Ok(vec![self.parse(path, &source)?])
        }
    }

    /// Parse one definition; `path` selects the format and the default name.
    pub fn parse(&self, path: &Path, source: &str) -> Result<Form, FormLoadError> {
        let parse_error = |message: String| FormLoadError::Parse {
            path: path.to_path_buf(),
            message,
        };
        let dto: FormDto = match Format::from_path(path) {
            Some(Format::Toml) => toml::from_str(source).map_err(|err| parse_error(err.to_string()))?,
            Some(Format::Json) => {
                serde_json::from_str(source).map_err(|err| parse_error(err.to_string()))?
            }
            None => return Err(parse_error("expected a .toml or .json file".to_owned())),
        };
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let form = self.build(path, stem, dto)?;
        for template in form.templates() {
            self.renderer
                .compile(template)
                .map_err(|source| FormLoadError::Template {
                    path: path.to_path_buf(),
                    form: form.name().to_owned(),
                    source,
                })?;
        }
        debug!(form = form.name(), path = %path.display(), "form definition loaded");
        Ok(form)
    }

    fn build(&self, path: &Path, stem: &str, dto: FormDto) -> Result<Form, FormLoadError> {
        let name = non_empty(dto.name).unwrap_or_else(|| stem.to_owned());
        let mut parts = FormParts::new(name);
        if let Some(table) = non_empty(dto.table) {
            parts.table = table;
        }
        parts.title = dto.title;
        parts.description = dto.description;
        parts.fields = dto
            .fields
            .into_iter()
            .map(|field| build_field(path, field))
            .collect::<Result<_, _>>()?;
        parts.policy = match non_empty(dto.policy) {
            Some(source) => {
                let evaluator =
                    self.policies
                        .compile(&source)
                        .map_err(|source| FormLoadError::Policy {
                            path: path.to_path_buf(),
                            source,
                        })?;
                Some(AccessPolicy::new(source, evaluator))
            }
            None => None,
        };
        parts.codes = dto.codes.into_iter().collect();
        for webhook in dto.webhooks {
            parts
                .targets
                .push(NotificationTarget::Webhook(build_webhook(path, webhook)?));
        }
        parts.targets.extend(
            dto.amqp
                .into_iter()
                .map(|amqp| NotificationTarget::Broker(build_broker(amqp))),
        );
        if let Some(success) = dto.success {
            parts.success_message = success;
        }
        if let Some(failed) = dto.failed {
            parts.failure_message = failed;
        }
        Form::try_new(parts).map_err(|source| FormLoadError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn collect_definitions(dir: &Dir, relative: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries = dir.entries()?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let path = relative.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            collect_definitions(&entry.open_dir()?, &path, out)?;
        } else if Format::from_path(&path).is_some() {
            out.push(path);
        }
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn build_field(path: &Path, dto: FieldDto) -> Result<Field, FormLoadError> {
    let pattern = match non_empty(dto.pattern) {
        Some(source) => Some(FieldPattern::new(&source).map_err(|err| FormLoadError::Pattern {
            path: path.to_path_buf(),
            field: dto.name.clone(),
            message: err.to_string(),
        })?),
        None => None,
    };
    let mut field = Field::new(dto.name, dto.kind);
    if let Some(label) = non_empty(dto.label) {
        field.label = label;
    }
    field.description = non_empty(dto.description);
    field.required = dto.required;
    field.disabled = dto.disabled;
    field.hidden = dto.hidden;
    field.multiple = dto.multiple;
    field.multiline = dto.multiline;
    field.icon = non_empty(dto.icon);
    field.default = dto.default;
    field.pattern = pattern;
    field.options = dto.options;
    Ok(field)
}

fn build_webhook(path: &Path, dto: WebhookDto) -> Result<WebhookTarget, FormLoadError> {
    let invalid = |value: &str, message: String| FormLoadError::Webhook {
        path: path.to_path_buf(),
        value: value.to_owned(),
        message,
    };
    let url = Url::parse(&dto.url).map_err(|err| invalid(&dto.url, err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(&dto.url, "scheme must be http or https".to_owned()));
    }
    let method = non_empty(dto.method)
        .map(|method| method.to_ascii_uppercase())
        .unwrap_or_else(|| "POST".to_owned());
    if !method.bytes().all(|byte| byte.is_ascii_alphabetic()) {
        return Err(invalid(&method, "method must be a single token".to_owned()));
    }
    Ok(WebhookTarget {
        url,
        method,
        headers: dto.headers,
        payload: dto.message,
        retry: retry_policy(dto.retry, dto.timeout, dto.interval),
    })
}

fn build_broker(dto: AmqpDto) -> BrokerTarget {
    BrokerTarget {
        exchange: dto.exchange,
        routing_key: dto.key,
        content_type: non_empty(dto.content_type),
        correlation_id: non_empty(dto.correlation),
        message_id: non_empty(dto.id),
        headers: dto.headers,
        payload: dto.message,
        retry: retry_policy(dto.retry, dto.timeout, dto.interval),
    }
}

/// Zero or absent values take the defaults; a negative `retry` disables
/// retries.
fn retry_policy(retry: Option<i64>, timeout: Option<u64>, interval: Option<u64>) -> RetryPolicy {
    let retry = match retry {
        None | Some(0) => RetryPolicy::DEFAULT_RETRY,
        Some(count) if count < 0 => 0,
        Some(count) => u32::try_from(count).unwrap_or(u32::MAX),
    };
    let seconds = |value: Option<u64>, fallback: Duration| match value {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => fallback,
    };
    RetryPolicy {
        retry,
        timeout: seconds(timeout, RetryPolicy::DEFAULT_TIMEOUT),
        interval: seconds(interval, RetryPolicy::DEFAULT_INTERVAL),
    }
}
