//! Built-in processors declared in `frond.toml`.
//!
//! Each `[[preprocessors]]` / `[[postprocessors]]` entry becomes a
//! [`Processor`] whose factory yields one stage implementing its action.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use frond_shared::{Asset, BuildConfig, FrondError, ProcessorAction, ProcessorConfig, Result};

use crate::processor::{
    Processor, ProcessorContext, ProcessorFactory, ProcessorStore, Produced, Stage, StageRef,
};

/// Placeholder replaced with the asset's basename at run time.
const FILENAME_PLACEHOLDER: &str = "{{filename}}";

// ---------------------------------------------------------------------------
// Store construction
// ---------------------------------------------------------------------------

/// Build the (pre, post) processor stores declared in `config`.
pub fn stores_from_config(config: &BuildConfig) -> Result<(ProcessorStore, ProcessorStore)> {
    let mut pre = ProcessorStore::new();
    for entry in &config.preprocessors {
        pre.register(processor_from_config(entry)?);
    }

    let mut post = ProcessorStore::new();
    for entry in &config.postprocessors {
        post.register(processor_from_config(entry)?);
    }

    debug!(pre = pre.len(), post = post.len(), "processor stores built");
    Ok((pre, post))
}

/// Turn one config entry into a registered processor.
pub fn processor_from_config(entry: &ProcessorConfig) -> Result<Processor> {
    let replace = match &entry.action {
        ProcessorAction::Replace { pattern, .. } => Some(compile(&entry.extension, pattern)?),
        _ => None,
    };

    let name = format!("{}:{}", entry.extension, entry.action.name());
    let factory = BuiltinFactory {
        name: name.clone(),
        action: entry.action.clone(),
        replace,
    };

    let mut processor = Processor::from_factory(&entry.extension, Arc::new(factory)).named(name);
    if let Some(pattern) = &entry.pattern {
        processor = processor.with_pattern(compile(&entry.extension, pattern)?);
    }
    if let Some(target) = &entry.target {
        processor = processor.with_target(target);
    }
    Ok(processor)
}

fn compile(extension: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| FrondError::processor(extension, format!("invalid pattern: {e}")))
}

/// Substitute `{{name}}` for every string/number/bool in `vars`.
fn render_vars(text: &str, vars: &toml::Table) -> String {
    vars.iter().fold(text.to_string(), |acc, (key, value)| {
        let rendered = match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            _ => return acc,
        };
        acc.replace(&format!("{{{{{key}}}}}"), &rendered)
    })
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

struct BuiltinFactory {
    name: String,
    action: ProcessorAction,
    replace: Option<Regex>,
}

impl ProcessorFactory for BuiltinFactory {
    fn build(
        &self,
        global: &BuildConfig,
        _context: Option<&ProcessorContext>,
    ) -> Result<Produced<StageRef>> {
        let name = self.name.clone();
        let stage: StageRef = match &self.action {
            ProcessorAction::Identity => Arc::new(IdentityStage { name }),
            ProcessorAction::Banner { text } => Arc::new(BannerStage {
                name,
                text: render_vars(text, &global.vars),
            }),
            ProcessorAction::Replace { replacement, .. } => {
                let Some(regex) = self.replace.clone() else {
                    return Err(FrondError::processor(&self.name, "replace pattern missing"));
                };
                Arc::new(ReplaceStage {
                    name,
                    regex,
                    replacement: render_vars(replacement, &global.vars),
                })
            }
            ProcessorAction::Command { program, args } => Arc::new(CommandStage {
                name,
                program: program.clone(),
                args: args.iter().map(|a| render_vars(a, &global.vars)).collect(),
            }),
        };
        Ok(Produced::One(stage))
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

struct IdentityStage {
    name: String,
}

impl Stage for IdentityStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, asset: Asset) -> Result<Produced<Asset>> {
        Ok(Produced::One(asset))
    }
}

struct BannerStage {
    name: String,
    text: String,
}

impl Stage for BannerStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, mut asset: Asset) -> Result<Produced<Asset>> {
        let banner = self.text.replace(FILENAME_PLACEHOLDER, &asset.basename());
        let mut contents = banner.into_bytes();
        contents.push(b'\n');
        contents.append(&mut asset.contents);
        asset.contents = contents;
        Ok(Produced::One(asset))
    }
}

struct ReplaceStage {
    name: String,
    regex: Regex,
    replacement: String,
}

impl Stage for ReplaceStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, mut asset: Asset) -> Result<Produced<Asset>> {
        let replaced = self
            .regex
            .replace_all(asset.text()?, self.replacement.as_str())
            .into_owned();
        asset.set_text(replaced);
        Ok(Produced::One(asset))
    }
}

/// Pipes contents through an external program: stdin in, stdout out.
struct CommandStage {
    name: String,
    program: String,
    args: Vec<String>,
}

impl Stage for CommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, mut asset: Asset) -> Result<Produced<Asset>> {
        let filename = asset.basename();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(FILENAME_PLACEHOLDER, &filename))
            .collect();

        debug!(program = %self.program, ?args, file = %filename, "running command");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                FrondError::stage(&self.name, format!("failed to spawn {}: {e}", self.program))
            })?;

        // Feed stdin from another thread so a chatty child cannot deadlock us.
        let stdin = child.stdin.take();
        let input = std::mem::take(&mut asset.contents);
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input)?;
            }
            Ok(())
        });

        let output = child.wait_with_output().map_err(|e| {
            FrondError::stage(&self.name, format!("failed to wait for {}: {e}", self.program))
        })?;

        match writer.join() {
            Ok(Ok(())) => {}
            // The child may legitimately exit without reading all input.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(FrondError::stage(
                    &self.name,
                    format!("failed to write to {}: {e}", self.program),
                ));
            }
            Err(_) => {
                return Err(FrondError::stage(&self.name, "stdin writer panicked"));
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                format!("{}: {stderr}", self.program)
            };
            return Err(FrondError::stage(&self.name, message));
        }

        asset.contents = output.stdout;
        Ok(Produced::One(asset))
    }
}
