//! Extension chains and output-filename rewriting.
//!
//! A filename's extension chain is its dot-separated suffixes, outermost
//! first: `app.coffee.js` → `["js", "coffee"]`. Post-processors are resolved
//! in this order, so the outer extension's processors run before the inner
//! ones.

use std::collections::BTreeMap;

use crate::processor::ProcessorStore;

/// Source extension → output extension.
pub type ExtensionMap = BTreeMap<String, String>;

/// Ordered extensions to probe for `filename` (a basename).
///
/// Empty segments are dropped before the base segment is removed, so
/// `.htaccess` and `README` both have an empty chain.
pub fn extension_chain(filename: &str) -> Vec<String> {
    let mut segments: Vec<String> = filename
        .split('.')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if segments.is_empty() {
        return segments;
    }

    segments.remove(0);
    segments.reverse();
    segments
}

/// Rewrite every mapped extension in `filename`, leaving the rest verbatim.
///
/// The base name and the number of extension segments are preserved:
/// with `{coffee: js}`, `app.coffee.min` becomes `app.js.min`.
pub fn rewrite_extensions(filename: &str, extension_map: &ExtensionMap) -> String {
    let chain = extension_chain(filename);
    if chain.is_empty() {
        return filename.to_string();
    }

    // Walk the raw segments so leading/duplicate dots survive untouched.
    // Only non-empty segments after the first non-empty one are extensions.
    let mut seen_base = false;
    filename
        .split('.')
        .map(|segment| {
            if segment.is_empty() {
                return segment.to_string();
            }
            if !seen_base {
                seen_base = true;
                return segment.to_string();
            }
            extension_map
                .get(segment)
                .cloned()
                .unwrap_or_else(|| segment.to_string())
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Restrict `extension_map` to extensions of `filename` that have at least
/// one processor registered in any of `stores`.
///
/// Unregistered extensions are left out so such files keep their original
/// suffix (for instance to deliberately emit an `index.coffee`).
pub fn registered_extension_map(
    filename: &str,
    extension_map: &ExtensionMap,
    stores: &[&ProcessorStore],
) -> ExtensionMap {
    extension_chain(filename)
        .into_iter()
        .filter_map(|ext| {
            let target = extension_map.get(&ext)?;
            let registered = stores
                .iter()
                .any(|store| !store.get(&ext, filename).is_empty());
            registered.then(|| (ext, target.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{Processor, Produced};

    fn map(pairs: &[(&str, &str)]) -> ExtensionMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn chain_is_outermost_first() {
        assert_eq!(extension_chain("app.coffee.js"), vec!["js", "coffee"]);
        assert_eq!(extension_chain("main.scss"), vec!["scss"]);
        assert_eq!(
            extension_chain("index.html.ejs.md"),
            vec!["md", "ejs", "html"]
        );
    }

    #[test]
    fn chain_empty_without_extensions() {
        assert!(extension_chain("README").is_empty());
        assert!(extension_chain("").is_empty());
        assert!(extension_chain(".htaccess").is_empty());
    }

    #[test]
    fn chain_skips_empty_segments() {
        assert_eq!(extension_chain(".eslintrc.json"), vec!["json"]);
        assert_eq!(extension_chain("app..js"), vec!["js"]);
    }

    #[test]
    fn rewrite_leaves_unmapped_extensions() {
        let m = map(&[("coffee", "js")]);
        assert_eq!(rewrite_extensions("app.coffee.min", &m), "app.js.min");
        assert_eq!(rewrite_extensions("app.less", &m), "app.less");
        assert_eq!(rewrite_extensions("README", &m), "README");
    }

    #[test]
    fn rewrite_is_idempotent_when_target_is_not_a_key() {
        let m = map(&[("coffee", "js")]);
        let once = rewrite_extensions("app.coffee.min", &m);
        assert_eq!(rewrite_extensions(&once, &m), once);
    }

    #[test]
    fn rewrite_never_touches_the_base_name() {
        let m = map(&[("scss", "css")]);
        assert_eq!(rewrite_extensions("scss.scss", &m), "scss.css");
        assert_eq!(rewrite_extensions(".scss.scss", &m), ".scss.css");
    }

    #[test]
    fn registered_map_only_keeps_extensions_with_processors() {
        let mut store = ProcessorStore::new();
        store.register(Processor::new("coffee", |_, _| Ok(Produced::None)));

        let m = map(&[("coffee", "js"), ("less", "css")]);
        let registered = registered_extension_map("app.coffee", &m, &[&store]);
        assert_eq!(registered, map(&[("coffee", "js")]));

        let registered = registered_extension_map("site.less", &m, &[&store]);
        assert!(registered.is_empty());
    }

    #[test]
    fn registered_map_consults_every_store() {
        let pre = ProcessorStore::new();
        let mut post = ProcessorStore::new();
        post.register(Processor::new("less", |_, _| Ok(Produced::None)));

        let m = map(&[("less", "css")]);
        let registered = registered_extension_map("site.less", &m, &[&pre, &post]);
        assert_eq!(registered, map(&[("less", "css")]));
    }
}
