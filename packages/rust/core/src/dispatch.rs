//! Extension dispatch: turn a filename into its ordered list of stages.

use tracing::debug;

use frond_shared::{BuildConfig, Result};

use crate::extension::extension_chain;
use crate::processor::{ProcessorContext, ProcessorStore, StageRef};

/// Build the complete, ordered transform chain for `filename`.
///
/// Order is extension chain order (outermost first), then processor
/// registration order, then the order each factory returned its stages in.
/// Factory errors are returned to the caller untouched.
pub fn stages_for_file(
    filename: &str,
    store: &ProcessorStore,
    global: &BuildConfig,
    context: Option<&ProcessorContext>,
) -> Result<Vec<StageRef>> {
    let mut stages = Vec::new();

    for ext in extension_chain(filename) {
        for processor in store.get(&ext, filename) {
            let produced = processor.build(global, context)?;
            debug!(
                filename,
                extension = %ext,
                processor = processor.name(),
                stages = produced.len(),
                "processor matched"
            );
            stages.extend(produced.into_vec());
        }
    }

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::processor::{Processor, Produced, stage_fn};
    use frond_shared::FrondError;

    fn named(name: &'static str) -> StageRef {
        stage_fn(name, |asset| Ok(Produced::One(asset)))
    }

    fn names(stages: &[StageRef]) -> Vec<String> {
        stages.iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn no_extension_yields_no_stages() {
        let mut store = ProcessorStore::new();
        store.register(Processor::new("md", |_, _| Ok(Produced::One(named("md")))));

        let stages = stages_for_file("README", &store, &BuildConfig::default(), None).unwrap();
        assert!(stages.is_empty());
    }

    #[test]
    fn ordering_is_extension_then_registration() {
        let mut store = ProcessorStore::new();
        store.register(Processor::new("coffee", |_, _| Ok(Produced::One(named("coffee-1")))));
        store.register(Processor::new("js", |_, _| Ok(Produced::One(named("js-1")))));
        store.register(Processor::new("coffee", |_, _| Ok(Produced::One(named("coffee-2")))));
        store.register(Processor::new("js", |_, _| Ok(Produced::One(named("js-2")))));

        let stages =
            stages_for_file("app.coffee.js", &store, &BuildConfig::default(), None).unwrap();
        assert_eq!(names(&stages), vec!["js-1", "js-2", "coffee-1", "coffee-2"]);
    }

    #[test]
    fn none_contributes_nothing_and_many_is_flattened() {
        let mut store = ProcessorStore::new();
        store.register(Processor::new("js", |_, _| Ok(Produced::None)));
        store.register(Processor::new("js", |_, _| {
            Ok(Produced::Many(vec![named("lint"), named("minify")]))
        }));

        let stages = stages_for_file("app.js", &store, &BuildConfig::default(), None).unwrap();
        assert_eq!(names(&stages), vec!["lint", "minify"]);
    }

    #[test]
    fn single_stage_equals_one_element_list() {
        let mut single = ProcessorStore::new();
        single.register(Processor::new("css", |_, _| Ok(Produced::One(named("prefix")))));
        let mut listed = ProcessorStore::new();
        listed.register(Processor::new("css", |_, _| Ok(Produced::Many(vec![named("prefix")]))));

        let global = BuildConfig::default();
        let a = stages_for_file("site.css", &single, &global, None).unwrap();
        let b = stages_for_file("site.css", &listed, &global, None).unwrap();
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn factory_receives_global_and_context() {
        let mut store = ProcessorStore::new();
        store.register(Processor::new("html", |global, context| {
            assert_eq!(global.target_path, "dist");
            let ctx = context.expect("context passed through");
            assert!(ctx.included_from.is_some());
            Ok(Produced::None)
        }));

        let global = BuildConfig {
            target_path: "dist".into(),
            ..BuildConfig::default()
        };
        let ctx = ProcessorContext {
            source_path: "/src/_nav.html".into(),
            included_from: Some("/src/index.html".into()),
        };
        stages_for_file("_nav.html", &store, &global, Some(&ctx)).unwrap();
    }

    #[test]
    fn factory_errors_propagate() {
        let mut store = ProcessorStore::new();
        store.register(Processor::new("ts", |_, _| {
            Err(FrondError::processor("ts", "compiler missing"))
        }));

        let err = stages_for_file("app.ts", &store, &BuildConfig::default(), None)
            .err()
            .expect("factory error");
        assert!(err.to_string().contains("compiler missing"));
    }

    #[test]
    fn stages_are_shared_handles() {
        let shared = named("shared");
        let handle = Arc::clone(&shared);
        let mut store = ProcessorStore::new();
        store.register(Processor::new("js", move |_, _| {
            Ok(Produced::One(Arc::clone(&handle)))
        }));

        let stages = stages_for_file("a.js", &store, &BuildConfig::default(), None).unwrap();
        assert!(Arc::ptr_eq(&stages[0], &shared));
    }
}
