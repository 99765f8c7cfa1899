//! Command Construction
//!
//! Turns a prompt, referenced files and options into the argument vector for
//! a service, using the service's flag table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::registry::ServiceConfig;

/// Per-call options mapped onto the service's flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationOptions {
    pub model: Option<String>,
    pub output_format: Option<String>,
    pub temperature: Option<f64>,
}

impl InvocationOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A program and its arguments, ready to spawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Shell-quoted command line, as recorded in the usage log
    pub fn command_line(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words).unwrap_or_else(|_| {
            let mut line = self.program.clone();
            for arg in &self.args {
                line.push(' ');
                line.push_str(arg);
            }
            line
        })
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// `@path` for files and `@dir/**/*` for directories; missing paths yield `None`
fn file_reference(path: &Path) -> Option<String> {
    if path.is_file() {
        Some(format!("@{}", path.display()))
    } else if path.is_dir() {
        Some(format!("@{}/**/*", path.display()))
    } else {
        None
    }
}

/// Build the invocation for `prompt` on `service`
///
/// Flags appear as model, output format, temperature, then the prompt flag.
/// Flags whose name is empty in the service's table are left out, and an
/// empty prompt flag passes the prompt positionally.
pub fn build_invocation(
    service: &ServiceConfig,
    prompt: &str,
    files: &[PathBuf],
    options: &InvocationOptions,
) -> Invocation {
    let flags = &service.flags;
    let temperature = options.temperature.map(|t| t.to_string());
    let optional = [
        (&flags.model, options.model.as_ref()),
        (&flags.output_format, options.output_format.as_ref()),
        (&flags.temperature, temperature.as_ref()),
    ];

    let mut args = Vec::new();
    for (flag, value) in optional {
        if let Some(value) = value {
            if !flag.is_empty() {
                args.push(flag.clone());
                args.push(value.clone());
            }
        }
    }

    let mut full_prompt: Vec<String> = files.iter().filter_map(|p| file_reference(p)).collect();
    full_prompt.push(prompt.to_string());

    if !flags.prompt.is_empty() {
        args.push(flags.prompt.clone());
    }
    args.push(full_prompt.join(" "));

    Invocation {
        program: service.command.clone(),
        args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_prompt_only() {
        let invocation = build_invocation(
            &ServiceConfig::gemini(),
            "hello",
            &[],
            &InvocationOptions::default(),
        );
        assert_eq!(invocation.program, "gemini");
        assert_eq!(invocation.args, vec!["-p", "hello"]);
    }

    #[test]
    fn test_flag_order_and_service_table() {
        let options = InvocationOptions::default()
            .with_temperature(0.5)
            .with_output_format("json")
            .with_model("qwen-max");

        let qwen = build_invocation(&ServiceConfig::qwen(), "go", &[], &options);
        assert_eq!(
            qwen.args,
            vec!["--model", "qwen-max", "--format", "json", "--temperature", "0.5", "-p", "go"]
        );

        let gemini = build_invocation(&ServiceConfig::gemini(), "go", &[], &options);
        assert_eq!(gemini.args[2], "--output-format");
    }

    #[test]
    fn test_file_references() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.rs");
        fs::write(&file, "fn main() {}").unwrap();
        let sub = dir.path().join("src");
        fs::create_dir_all(&sub).unwrap();
        let missing = dir.path().join("missing.txt");

        let invocation = build_invocation(
            &ServiceConfig::gemini(),
            "review",
            &[file.clone(), missing, sub.clone()],
            &InvocationOptions::default(),
        );

        let expected = format!("@{} @{}/**/* review", file.display(), sub.display());
        assert_eq!(invocation.args, vec!["-p".to_string(), expected]);
    }

    #[test]
    fn test_disabled_flags() {
        let mut service = ServiceConfig::new("plain", "tool", crate::registry::AuthMethod::Cli);
        service.flags.temperature = String::new();
        service.flags.prompt = String::new();

        let options = InvocationOptions::default().with_temperature(0.2);
        let invocation = build_invocation(&service, "hi there", &[], &options);
        assert_eq!(invocation.args, vec!["hi there"]);
    }

    #[test]
    fn test_command_line_quotes_arguments() {
        let invocation = Invocation {
            program: "gemini".to_string(),
            args: vec!["-p".to_string(), "what's up".to_string()],
        };
        let line = invocation.command_line();
        assert_eq!(
            shlex::split(&line).unwrap(),
            vec!["gemini", "-p", "what's up"]
        );
        assert_eq!(invocation.to_string(), line);
    }
}
