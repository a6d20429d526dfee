//! Include-directive expansion (the preprocess stage).
//!
//! A directive is a whole line such as `//= include lib/util.js`,
//! `#= include "_mixins.scss"`, `/*= include reset.css */` or
//! `<!--= include _nav.html -->`. The named file is read, expanded
//! recursively, run through its own pre-processors, and spliced in place of
//! the directive line.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use frond_shared::{Asset, BuildConfig, FrondError, Result};

use crate::context::BuildContext;
use crate::dispatch::stages_for_file;
use crate::extension::{ExtensionMap, extension_chain};
use crate::processor::{ProcessorContext, ProcessorStore, Produced, Stage};

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)(?://|#|/\*|<!--)=[ \t]*include[ \t]+(?:"([^"]+)"|'([^']+)'|([^\s"']+?))[ \t]*(?:\*/|-->)?[ \t]*\r?$"#,
    )
    .expect("valid regex")
});

/// Parameters for [`DirectiveExpander`].
#[derive(Debug, Clone)]
pub struct DirectiveOptions {
    /// Project root, used to shorten paths in error messages.
    pub root_path: PathBuf,
    /// Absolute source directory; `/`-prefixed includes resolve here.
    pub source_root: PathBuf,
    /// Extensions whose files are scanned for directives.
    pub file_types: Vec<String>,
    /// Processors applied to each included file.
    pub processors: Arc<ProcessorStore>,
    /// Global config handed to those processors.
    pub global: Arc<BuildConfig>,
    /// Used to find `lib.coffee` when a directive asks for `lib.js`.
    pub extension_map: ExtensionMap,
}

impl DirectiveOptions {
    /// Options for a build: pre-processor store, config directive types.
    pub fn from_context(ctx: &BuildContext) -> Self {
        Self {
            root_path: ctx.root_path.clone(),
            source_root: ctx.source_dir(),
            file_types: ctx.config.directive_file_types.clone(),
            processors: Arc::clone(&ctx.preprocessors),
            global: Arc::clone(&ctx.config),
            extension_map: ctx.extension_map.clone(),
        }
    }
}

/// Stage that expands include directives in eligible files.
#[derive(Debug, Clone)]
pub struct DirectiveExpander {
    options: DirectiveOptions,
}

impl DirectiveExpander {
    pub fn new(options: DirectiveOptions) -> Self {
        Self { options }
    }

    /// Whether any extension of `filename` is a directive file type.
    pub fn is_eligible(&self, filename: &str) -> bool {
        extension_chain(filename)
            .iter()
            .any(|ext| self.options.file_types.contains(ext))
    }

    fn expand_text(&self, path: &Path, text: &str, stack: &mut Vec<PathBuf>) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in DIRECTIVE_RE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(target) = caps.get(2).or(caps.get(3)).or(caps.get(4)) else {
                continue;
            };
            let indent = caps.get(1).map_or("", |m| m.as_str());

            out.push_str(&text[last..whole.start()]);
            out.push_str(&indent_lines(&self.include(path, target.as_str(), stack)?, indent));
            last = whole.end();
        }

        out.push_str(&text[last..]);
        Ok(out)
    }

    fn include(&self, parent: &Path, target: &str, stack: &mut Vec<PathBuf>) -> Result<String> {
        let path = self.resolve_include(parent, target)?;

        if stack.contains(&path) {
            let chain: Vec<String> = stack
                .iter()
                .chain(std::iter::once(&path))
                .map(|p| self.display(p))
                .collect();
            return Err(FrondError::directive(
                parent,
                format!("include cycle: {}", chain.join(" -> ")),
            ));
        }

        debug!(parent = %self.display(parent), include = %self.display(&path), "expanding include");

        let contents = std::fs::read(&path).map_err(|e| FrondError::io(&path, e))?;
        let mut asset = Asset::from_path(&path, contents);
        let filename = asset.basename();

        if self.is_eligible(&filename) {
            let text = asset.text()?.to_string();
            stack.push(path.clone());
            let expanded = self.expand_text(&path, &text, stack);
            stack.pop();
            asset.set_text(expanded?);
        }

        let context = ProcessorContext {
            source_path: path.clone(),
            included_from: Some(parent.to_path_buf()),
        };
        let stages = stages_for_file(
            &filename,
            &self.options.processors,
            &self.options.global,
            Some(&context),
        )?;

        let mut assets = vec![asset];
        for stage in stages {
            let mut next = Vec::with_capacity(assets.len());
            for asset in assets {
                next.extend(stage.apply(asset)?.into_vec());
            }
            assets = next;
        }

        let mut text = String::new();
        for asset in &assets {
            text.push_str(asset.text()?);
        }

        // The directive line keeps its own line ending.
        let text = match text.strip_suffix('\n') {
            Some(rest) => rest.strip_suffix('\r').unwrap_or(rest).to_string(),
            None => text,
        };
        Ok(text)
    }

    fn resolve_include(&self, parent: &Path, target: &str) -> Result<PathBuf> {
        let candidate = match target.strip_prefix('/') {
            Some(rooted) => self.options.source_root.join(rooted),
            None => parent.parent().unwrap_or(Path::new("")).join(target),
        };

        if candidate.is_file() {
            return canonical(&candidate);
        }

        // `include "lib.js"` may refer to a source that compiles to js.
        let filename = candidate
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(outer) = extension_chain(&filename).first() {
            for (source_ext, output_ext) in &self.options.extension_map {
                if output_ext == outer {
                    let alternative = candidate.with_extension(source_ext);
                    if alternative.is_file() {
                        return canonical(&alternative);
                    }
                }
            }
        }

        Err(FrondError::directive(
            parent,
            format!("cannot resolve include '{target}'"),
        ))
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.options.root_path)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Resolved include paths are canonical so `../` spellings compare equal.
fn canonical(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| FrondError::io(path, e))
}

/// Prefix every non-empty line of `text` with `indent`.
fn indent_lines(text: &str, indent: &str) -> String {
    if indent.is_empty() {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| {
            if line.trim_end_matches('\r').is_empty() {
                line.to_string()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Stage for DirectiveExpander {
    fn name(&self) -> &str {
        "directives"
    }

    fn apply(&self, mut asset: Asset) -> Result<Produced<Asset>> {
        if !self.is_eligible(&asset.basename()) {
            return Ok(Produced::One(asset));
        }

        let text = asset.text()?;
        if !DIRECTIVE_RE.is_match(text) {
            return Ok(Produced::One(asset));
        }

        let text = text.to_string();
        // In-memory assets may not exist on disk; their own path seeds the stack.
        let path = canonical(&asset.path).unwrap_or_else(|_| asset.path.clone());
        let mut stack = vec![path.clone()];
        let expanded = self.expand_text(&path, &text, &mut stack)?;
        asset.set_text(expanded);
        Ok(Produced::One(asset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{Processor, stage_fn};

    struct Fixture {
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root =
                std::env::temp_dir().join(format!("frond-directives-{}", uuid::Uuid::now_v7()));
            std::fs::create_dir_all(root.join("source")).unwrap();
            Self { root }
        }

        fn write(&self, rel: &str, text: &str) -> PathBuf {
            let path = self.root.join("source").join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, text).unwrap();
            path
        }

        fn expander(&self, processors: ProcessorStore) -> DirectiveExpander {
            let config = BuildConfig::default();
            DirectiveExpander::new(DirectiveOptions {
                root_path: self.root.clone(),
                source_root: self.root.join("source"),
                file_types: config.directive_file_types.clone(),
                processors: Arc::new(processors),
                extension_map: config.extension_map.clone(),
                global: Arc::new(config),
            })
        }

        fn expand(&self, expander: &DirectiveExpander, path: &Path) -> Result<String> {
            let asset = Asset::from_path(path, std::fs::read(path).unwrap());
            let out = expander.apply(asset)?.into_vec();
            Ok(out[0].text()?.to_string())
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    #[test]
    fn expands_relative_and_rooted_includes() {
        let fx = Fixture::new();
        fx.write("js/lib/util.js", "function util() {}\n");
        fx.write("vendor.js", "var vendor = 1;\n");
        let main = fx.write(
            "js/app.js",
            "//= include lib/util.js\n//= include \"/vendor.js\"\nutil();\n",
        );

        let out = fx.expand(&fx.expander(ProcessorStore::new()), &main).unwrap();
        assert_eq!(out, "function util() {}\nvar vendor = 1;\nutil();\n");
    }

    #[test]
    fn supports_comment_styles() {
        let fx = Fixture::new();
        fx.write("_reset.css", "* { margin: 0 }\n");
        fx.write("_nav.html", "<nav></nav>\n");
        let css = fx.write("site.css", "/*= include _reset.css */\nbody {}\n");
        let html = fx.write("index.html", "<body>\n  <!--= include '_nav.html' -->\n</body>\n");

        let expander = fx.expander(ProcessorStore::new());
        assert_eq!(fx.expand(&expander, &css).unwrap(), "* { margin: 0 }\nbody {}\n");
        assert_eq!(
            fx.expand(&expander, &html).unwrap(),
            "<body>\n  <nav></nav>\n</body>\n"
        );
    }

    #[test]
    fn nested_includes_expand_recursively() {
        let fx = Fixture::new();
        fx.write("c.js", "c;\n");
        fx.write("b.js", "//= include c.js\nb;\n");
        let a = fx.write("a.js", "//= include b.js\na;\n");

        let out = fx.expand(&fx.expander(ProcessorStore::new()), &a).unwrap();
        assert_eq!(out, "c;\nb;\na;\n");
    }

    #[test]
    fn include_cycle_is_an_error() {
        let fx = Fixture::new();
        fx.write("b.js", "//= include a.js\n");
        let a = fx.write("a.js", "//= include b.js\n");

        let err = fx.expand(&fx.expander(ProcessorStore::new()), &a).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("include cycle"), "{message}");
        assert!(message.contains("a.js -> "), "{message}");
    }

    #[test]
    fn parent_relative_self_include_is_a_cycle() {
        let fx = Fixture::new();
        let a = fx.write("js/a.js", "//= include ../js/a.js\n");

        let err = fx.expand(&fx.expander(ProcessorStore::new()), &a).unwrap_err();
        assert!(matches!(err, FrondError::Directive { .. }));
        assert!(err.to_string().contains("include cycle"));
    }

    #[test]
    fn parent_relative_mutual_includes_are_a_cycle() {
        let fx = Fixture::new();
        fx.write("css/b.css", "/*= include ../css/a.css */\n");
        let a = fx.write("css/a.css", "/*= include ./b.css */\n");

        let err = fx.expand(&fx.expander(ProcessorStore::new()), &a).unwrap_err();
        assert!(err.to_string().contains("include cycle"));
    }

    #[test]
    fn indentation_is_applied_to_every_included_line() {
        let fx = Fixture::new();
        fx.write("_list.html", "<ul>\n  <li>a</li>\n\n</ul>\n");
        let page = fx.write("page.html", "<nav>\n    <!--= include _list.html -->\n</nav>\n");

        let out = fx.expand(&fx.expander(ProcessorStore::new()), &page).unwrap();
        assert_eq!(out, "<nav>\n    <ul>\n      <li>a</li>\n\n    </ul>\n</nav>\n");
    }

    #[test]
    fn missing_include_is_an_error() {
        let fx = Fixture::new();
        let a = fx.write("a.js", "//= include nowhere.js\n");

        let err = fx.expand(&fx.expander(ProcessorStore::new()), &a).unwrap_err();
        assert!(err.to_string().contains("cannot resolve include 'nowhere.js'"));
    }

    #[test]
    fn output_extension_falls_back_to_source_extension() {
        let fx = Fixture::new();
        fx.write("lib.coffee", "square = (x) -> x * x\n");
        let app = fx.write("app.js", "//= include lib.js\n");

        let out = fx.expand(&fx.expander(ProcessorStore::new()), &app).unwrap();
        assert_eq!(out, "square = (x) -> x * x\n");
    }

    #[test]
    fn included_files_run_through_preprocessors() {
        let fx = Fixture::new();
        fx.write("_partial.md", "hello\n");
        let page = fx.write("page.html", "<!--= include _partial.md -->\n");

        let mut store = ProcessorStore::new();
        store.register(Processor::new("md", |_, context| {
            let from = context
                .and_then(|c| c.included_from.clone())
                .expect("included_from set");
            assert!(from.ends_with("page.html"));
            Ok(Produced::One(stage_fn("md", |mut asset: Asset| {
                let html = format!("<p>{}</p>\n", asset.text()?.trim());
                asset.set_text(html);
                Ok(Produced::One(asset))
            })))
        }));

        let out = fx.expand(&fx.expander(store), &page).unwrap();
        assert_eq!(out, "<p>hello</p>\n");
    }

    #[test]
    fn ineligible_files_pass_through() {
        let fx = Fixture::new();
        let data = fx.write("data.json", "//= include nowhere.js\n");

        let out = fx.expand(&fx.expander(ProcessorStore::new()), &data).unwrap();
        assert_eq!(out, "//= include nowhere.js\n");
    }
}
