use domain_benchmark::exception::{CloudPerfException, CloudPerfResult};
use handlebars::Handlebars;

/// A benchmark command with `{{numcpu}}` placeholders.
///
/// Shell syntax in the command, quotes, braces and redirections, is passed
/// through untouched.
pub struct CommandTemplate<'a> {
    benchmark_id: &'a str,
    registry: Handlebars<'a>,
}

impl<'a> CommandTemplate<'a> {
    pub fn new(benchmark_id: &'a str, cmd: &str) -> CloudPerfResult<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(benchmark_id, cmd)
            .map_err(|e| CloudPerfException::Template {
                benchmark_id: benchmark_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            benchmark_id,
            registry,
        })
    }

    pub fn render(&self, numcpu: u32) -> CloudPerfResult<String> {
        self.registry
            .render(self.benchmark_id, &serde_json::json!({ "numcpu": numcpu }))
            .map_err(|e| CloudPerfException::Template {
                benchmark_id: self.benchmark_id.to_string(),
                reason: e.to_string(),
            })
    }
}
