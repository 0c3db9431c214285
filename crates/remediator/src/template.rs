//! Command-line templating using Tera
//!
//! Executor programs and arguments are written as templates over the
//! remediation context (`target`, `action`). Alertmanager users tend to write
//! Go template syntax, so `{{ .target }}` is accepted alongside Tera's
//! `{{ target }}`.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tera::{Context, Tera};

use crate::{Error, Result};

lazy_static! {
    static ref GO_DEFAULT_QUOTED: Regex =
        Regex::new(r#"\{\{([^}]+)\|\s*default\s+["']([^"']+)["']\s*\}\}"#).unwrap();
    static ref GO_DEFAULT_BARE: Regex =
        Regex::new(r#"\{\{([^}]+)\|\s*default\s+([^}\s(]+)\s*\}\}"#).unwrap();
}

/// Convert Go template syntax to Tera syntax
///
/// Handles common patterns:
/// - {{ .path.to.value }} -> {{ path.to.value }}
/// - {{ .value | default "default" }} -> {{ value | default(value="default") }}
pub fn convert_go_to_tera(template: &str) -> String {
    let converted = template
        .replace("{{ .", "{{ ")
        .replace("{{.", "{{");

    let converted = GO_DEFAULT_QUOTED.replace_all(&converted, "{{$1| default(value=\"$2\") }}");
    GO_DEFAULT_BARE
        .replace_all(&converted, "{{$1| default(value=\"$2\") }}")
        .to_string()
}

fn tera_context(context: &Value) -> Context {
    let mut tera_context = Context::new();
    match context {
        Value::Object(map) => {
            for (key, value) in map {
                tera_context.insert(key, value);
            }
        }
        _ => tera_context.insert("data", context),
    }
    tera_context
}

/// A program plus argument list, parsed once and rendered per invocation.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    tera: Tera,
    arg_count: usize,
}

impl CommandTemplate {
    pub fn parse(program: &str, args: &[String]) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("program", &convert_go_to_tera(program))
            .map_err(|e| Error::Template(format!("Invalid program template '{}': {}", program, e)))?;

        for (idx, arg) in args.iter().enumerate() {
            tera.add_raw_template(&format!("arg{}", idx), &convert_go_to_tera(arg))
                .map_err(|e| Error::Template(format!("Invalid argument template '{}': {}", arg, e)))?;
        }

        Ok(Self {
            tera,
            arg_count: args.len(),
        })
    }

    /// Render the program and its arguments. Empty rendered arguments are dropped.
    pub fn render(&self, context: &Value) -> Result<(String, Vec<String>)> {
        let ctx = tera_context(context);
        let render = |name: &str| {
            self.tera
                .render(name, &ctx)
                .map_err(|e| Error::Template(format!("Failed to render {}: {}", name, e)))
        };

        let program = render("program")?;
        let mut args = Vec::with_capacity(self.arg_count);
        for idx in 0..self.arg_count {
            let arg = render(&format!("arg{}", idx))?;
            if !arg.is_empty() {
                args.push(arg);
            }
        }

        Ok((program, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_go_to_tera() {
        let tests = vec![
            ("{{ .target }}", "{{ target }}"),
            ("{{.action}}", "{{action}}"),
            ("{{ .user | default \"ansible\" }}", "{{ user | default(value=\"ansible\") }}"),
            ("{{ .forks | default 5 }}", "{{ forks | default(value=\"5\") }}"),
        ];

        for (input, expected) in tests {
            assert_eq!(convert_go_to_tera(input), expected);
        }
    }

    #[test]
    fn go_syntax_and_defaults_render() {
        let context = json!({ "target": "web1", "action": "restart-nginx" });
        let template = CommandTemplate::parse(
            "ansible-playbook",
            &[
                "playbooks/{{ .action }}.yml".to_string(),
                "--user={{ .user | default \"ansible\" }}".to_string(),
            ],
        )
        .unwrap();

        let (_, args) = template.render(&context).unwrap();
        assert_eq!(args, vec!["playbooks/restart-nginx.yml", "--user=ansible"]);
    }

    #[test]
    fn command_template_renders_program_and_args() {
        let args = vec![
            "--limit".to_string(),
            "{{ target }}".to_string(),
            "{{ .action }}.yml".to_string(),
        ];
        let template = CommandTemplate::parse("ansible-playbook", &args).unwrap();
        let (program, rendered) = template
            .render(&json!({ "target": "web1", "action": "restart-nginx" }))
            .unwrap();

        assert_eq!(program, "ansible-playbook");
        assert_eq!(rendered, vec!["--limit", "web1", "restart-nginx.yml"]);
    }

    #[test]
    fn command_template_rejects_bad_syntax() {
        assert!(CommandTemplate::parse("ansible-playbook", &["{{ target".to_string()]).is_err());
    }

    #[test]
    fn missing_variables_fail_to_render() {
        let template = CommandTemplate::parse("echo", &["{{ host }}".to_string()]).unwrap();
        assert!(template.render(&json!({ "target": "web1" })).is_err());
    }
}
