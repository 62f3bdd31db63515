//! MiniJinja-backed template renderer.
//!
//! Templates are registered in the environment under their own source text,
//! so the environment doubles as the compiled-template cache. Insertion is
//! idempotent: two callers compiling the same source concurrently both store
//! the same template.

use std::sync::RwLock;

use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use pulldown_cmark::{Event, Options, Parser, html};

use crate::domain::ports::{TemplateError, TemplateRenderer};

/// Template renderer with `markdown`, `html`, and `tojson` filters plus a
/// `timezone()` function.
///
/// Undefined variables are errors, so a template referencing a renamed
/// field fails loudly instead of rendering an empty string.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use web_form::domain::ports::TemplateRenderer;
/// use web_form::outbound::template::MiniJinjaRenderer;
///
/// let renderer = MiniJinjaRenderer::new();
/// let text = renderer
///     .render("Hello {{ user }}", &json!({"user": "ann"}))
///     .expect("renders");
/// assert_eq!(text, "Hello ann");
/// ```
pub struct MiniJinjaRenderer {
    env: RwLock<Environment<'static>>,
}

impl MiniJinjaRenderer {
    /// Renderer with the standard helper set.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("markdown", markdown);
        env.add_filter("html", html_safe);
        env.add_function("timezone", server_timezone);
        Self {
            env: RwLock::new(env),
        }
    }

    fn is_cached(&self, source: &str) -> Result<bool, TemplateError> {
        let env = self.env.read().map_err(|_| poisoned())?;
        Ok(env.get_template(source).is_ok())
    }
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn compile(&self, source: &str) -> Result<(), TemplateError> {
        if self.is_cached(source)? {
            return Ok(());
        }
        let mut env = self.env.write().map_err(|_| poisoned())?;
        env.add_template_owned(source.to_owned(), source.to_owned())
            .map_err(|err| TemplateError::syntax(describe(&err)))
    }

    fn render(&self, source: &str, context: &serde_json::Value) -> Result<String, TemplateError> {
        self.compile(source)?;
        let env = self.env.read().map_err(|_| poisoned())?;
        let template = env
            .get_template(source)
            .map_err(|err| TemplateError::render(describe(&err)))?;
        template
            .render(context)
            .map_err(|err| TemplateError::render(describe(&err)))
    }
}

fn poisoned() -> TemplateError {
    TemplateError::render("template cache lock poisoned")
}

fn describe(err: &minijinja::Error) -> String {
    match err.detail() {
        Some(detail) => format!("{}: {detail}", err.kind()),
        None => err.kind().to_string(),
    }
}

/// Markdown to HTML with GitHub-style tables, strike-through and task
/// lists. Soft line breaks are kept as `<br />`.
fn markdown(value: &str) -> Value {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(value, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut rendered = String::with_capacity(value.len());
    html::push_html(&mut rendered, parser);
    Value::from_safe_string(rendered)
}

fn html_safe(value: &str) -> Value {
    Value::from_safe_string(value.to_owned())
}

/// Server time zone: `TZ` when set, otherwise the current UTC offset.
fn server_timezone() -> String {
    std::env::var("TZ")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| chrono::Local::now().offset().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn renderer() -> MiniJinjaRenderer {
        MiniJinjaRenderer::new()
    }

    #[rstest]
    fn renders_nested_context(renderer: MiniJinjaRenderer) {
        let text = renderer
            .render(
                "{{ form.name }}/{{ result.ID }}",
                &json!({"form": {"name": "signup"}, "result": {"ID": "r1"}}),
            )
            .expect("renders");
        assert_eq!(text, "signup/r1");
    }

    #[rstest]
    fn undefined_variables_fail(renderer: MiniJinjaRenderer) {
        let err = renderer
            .render("{{ missing.value }}", &json!({}))
            .expect_err("strict undefined");
        assert!(matches!(err, TemplateError::Render { .. }));
    }

    #[rstest]
    fn syntax_errors_surface_on_compile(renderer: MiniJinjaRenderer) {
        let err = renderer.compile("{{ unclosed").expect_err("bad syntax");
        assert!(matches!(err, TemplateError::Syntax { .. }));
    }

    #[rstest]
    fn compile_is_idempotent(renderer: MiniJinjaRenderer) {
        renderer.compile("{{ a }}").expect("first compile");
        renderer.compile("{{ a }}").expect("second compile");
        assert_eq!(
            renderer.render("{{ a }}", &json!({"a": 1})).expect("renders"),
            "1"
        );
    }

    #[rstest]
    fn markdown_filter_renders_html(renderer: MiniJinjaRenderer) {
        let text = renderer
            .render("{{ text | markdown }}", &json!({"text": "**bold**"}))
            .expect("renders");
        assert_eq!(text.trim(), "<p><strong>bold</strong></p>");
    }

    #[rstest]
    fn tojson_filter_serialises_values(renderer: MiniJinjaRenderer) {
        let text = renderer
            .render("{{ result | tojson }}", &json!({"result": {"year": 2024}}))
            .expect("renders");
        let parsed: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(parsed, json!({"year": 2024}));
    }

    #[rstest]
    fn values_are_not_html_escaped(renderer: MiniJinjaRenderer) {
        let text = renderer
            .render("{{ error }}", &json!({"error": "a < b"}))
            .expect("renders");
        assert_eq!(text, "a < b");
    }

    #[rstest]
    fn timezone_function_is_available(renderer: MiniJinjaRenderer) {
        let text = renderer.render("{{ timezone() }}", &json!({})).expect("renders");
        assert!(!text.is_empty());
    }
}
