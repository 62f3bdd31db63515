//! Driven port for rendering user-supplied templates.

use serde_json::Value;

use super::define_port_error;

define_port_error! {
    /// Errors raised while compiling or rendering a template.
    pub enum TemplateError {
        /// The template source does not parse.
        Syntax { message: String } => "invalid template: {message}",
        /// Rendering failed, e.g. an undefined variable was referenced.
        Render { message: String } => "template rendering failed: {message}",
    }
}

/// Port for rendering template sources against a JSON context.
///
/// Templates are identified by their source text; implementations cache the
/// compiled form and must tolerate two callers compiling the same source at
/// once.
#[cfg_attr(test, mockall::automock)]
pub trait TemplateRenderer: Send + Sync {
    /// Compile `source` into the cache, reporting syntax errors.
    fn compile(&self, source: &str) -> Result<(), TemplateError>;

    /// Render `source` with `context`.
    fn render(&self, source: &str, context: &Value) -> Result<String, TemplateError>;
}

/// Renderer resolving `{{ dotted.path }}` placeholders against the context.
///
/// Filters and control blocks are not supported. Unknown paths fail with
/// [`TemplateError::Render`] and unbalanced braces with
/// [`TemplateError::Syntax`].
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureTemplateRenderer;

#[cfg(test)]
impl FixtureTemplateRenderer {
    fn placeholders(source: &str) -> Result<Vec<(&str, &str)>, TemplateError> {
        let mut parts = Vec::new();
        let mut rest = source;
        while let Some((literal, tail)) = rest.split_once("{{") {
            let Some((path, after)) = tail.split_once("}}") else {
                return Err(TemplateError::syntax(format!("unclosed placeholder in `{source}`")));
            };
            parts.push((literal, path.trim()));
            rest = after;
        }
        parts.push((rest, ""));
        Ok(parts)
    }

    fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
        path.split('.')
            .try_fold(context, |value, segment| value.get(segment))
    }
}

#[cfg(test)]
impl TemplateRenderer for FixtureTemplateRenderer {
    fn compile(&self, source: &str) -> Result<(), TemplateError> {
        Self::placeholders(source).map(|_| ())
    }

    fn render(&self, source: &str, context: &Value) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(source.len());
        for (literal, path) in Self::placeholders(source)? {
            out.push_str(literal);
            if path.is_empty() {
                continue;
            }
            match Self::lookup(context, path) {
                Some(Value::String(text)) => out.push_str(text),
                Some(Value::Null) => {}
                Some(other) => out.push_str(&other.to_string()),
                None => {
                    return Err(TemplateError::render(format!("undefined value `{path}`")));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn fixture_resolves_nested_paths() {
        let context = json!({"form": {"name": "signup"}, "result": {"year": 2024}});
        let rendered = FixtureTemplateRenderer
            .render("{{ form.name }}/{{result.year}}!", &context)
            .expect("renders");
        assert_eq!(rendered, "signup/2024!");
    }

    #[test]
    fn fixture_rejects_unknown_paths_and_open_braces() {
        let renderer = FixtureTemplateRenderer;
        assert!(matches!(
            renderer.render("{{ missing.value }}", &json!({})),
            Err(TemplateError::Render { .. })
        ));
        assert!(matches!(
            renderer.compile("{{ user"),
            Err(TemplateError::Syntax { .. })
        ));
    }
}
