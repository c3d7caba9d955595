//! Ordered composition of invocable items.
//!
//! A [`Workflow`] is the plain form: run the items in order, let each one
//! read and write the context on its own terms. A [`Pipeline`] is the
//! chained form: the result of every item is folded into one context key
//! that the next item conventionally reads back, which turns the item list
//! into a left-to-right accumulator.

use std::sync::Arc;

use crate::context::Key;
use crate::{Context, Invoke, KeyflowError, Strategy, Value, value};

/// An ordered list of invocable items executed against a shared context.
pub struct Workflow {
    items: Vec<Arc<dyn Invoke>>,
    strategy: Arc<dyn Strategy<Workflow>>,
}

impl Workflow {
    pub fn new(items: impl IntoIterator<Item = Arc<dyn Invoke>>) -> Self {
        Self {
            items: items.into_iter().collect(),
            strategy: Arc::new(Sequence),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy<Workflow>>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn items(&self) -> &[Arc<dyn Invoke>] {
        &self.items
    }
}

impl Invoke for Workflow {
    fn invoke(&self, context: &mut Context) -> Result<Option<Value>, KeyflowError> {
        self.strategy.run(self, context)
    }
}

/// The default workflow strategy: invoke the items in list order and return
/// the last result. Purely an orchestrator; it never touches the context
/// itself, so an empty workflow returns `None` and changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequence;

impl Strategy<Workflow> for Sequence {
    fn run(&self, workflow: &Workflow, context: &mut Context) -> Result<Option<Value>, KeyflowError> {
        let mut last = None;
        for item in workflow.items() {
            last = item.invoke(context)?;
        }
        Ok(last)
    }
}

/// A chained workflow folding a running value through one context key.
///
/// Before the run, each `(source, destination)` alias copies an existing
/// context value under a second name; this seeds the keys the chain expects
/// to read, conventionally exposing some externally-named input under the
/// chain's internal name. After the run, `return_key` selects what to hand
/// back to the caller.
pub struct Pipeline {
    items: Vec<Arc<dyn Invoke>>,
    put_to: Key,
    aliases: Vec<(Key, Key)>,
    return_key: Option<Key>,
    strategy: Arc<dyn Strategy<Pipeline>>,
}

impl Pipeline {
    pub fn new(items: impl IntoIterator<Item = Arc<dyn Invoke>>, put_to: impl Into<Key>) -> Self {
        Self {
            items: items.into_iter().collect(),
            put_to: put_to.into(),
            aliases: Vec::new(),
            return_key: None,
            strategy: Arc::new(Fold),
        }
    }

    /// Copy `context[source]` to `context[destination]` before the run.
    /// Aliases apply in the order they were added, so a duplicate
    /// destination keeps the last write.
    pub fn alias(mut self, source: impl Into<Key>, destination: impl Into<Key>) -> Self {
        self.aliases.push((source.into(), destination.into()));
        self
    }

    /// Read this key from the context after the run and return its value.
    pub fn returning(mut self, key: impl Into<Key>) -> Self {
        self.return_key = Some(key.into());
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy<Pipeline>>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn items(&self) -> &[Arc<dyn Invoke>] {
        &self.items
    }

    pub fn put_to(&self) -> &Key {
        &self.put_to
    }

    pub fn aliases(&self) -> &[(Key, Key)] {
        &self.aliases
    }

    pub fn return_key(&self) -> Option<&Key> {
        self.return_key.as_ref()
    }
}

impl Invoke for Pipeline {
    fn invoke(&self, context: &mut Context) -> Result<Option<Value>, KeyflowError> {
        self.strategy.run(self, context)
    }
}

/// The default pipeline strategy, a left-to-right fold:
///
/// 1. Seed the aliases.
/// 2. Invoke each item in order and overwrite `put_to` with its result,
///    unconditionally. An item that yields no result stores the unit value.
/// 3. Read back `return_key` when one is set.
///
/// An empty item list still seeds the aliases and reads the return key; it
/// never writes `put_to`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fold;

impl Strategy<Pipeline> for Fold {
    fn run(&self, pipeline: &Pipeline, context: &mut Context) -> Result<Option<Value>, KeyflowError> {
        for (source, destination) in pipeline.aliases() {
            tracing::trace!(from = %source, to = %destination, "seeding alias");
            let seeded = context.lookup(source)?;
            context.insert(destination, seeded);
        }

        for item in pipeline.items() {
            let out = item.invoke(context)?;
            context.insert(pipeline.put_to(), out.unwrap_or_else(|| value(())));
        }

        match pipeline.return_key() {
            Some(key) => context.lookup(key).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Arg, Resolved, Signature};
    use crate::task::{Task, TaskFn};
    use crate::step;

    fn add() -> TaskFn {
        TaskFn::new(|args| {
            let x = num(&args, 0, "x")?;
            let y = num(&args, 1, "y")?;
            Ok(value(x + y))
        })
    }

    fn mul() -> TaskFn {
        TaskFn::new(|args| {
            let x = num(&args, 0, "x")?;
            let y = num(&args, 1, "y")?;
            Ok(value(x * y))
        })
    }

    fn sub() -> TaskFn {
        TaskFn::new(|args| {
            let x = num(&args, 0, "x")?;
            let y = num(&args, 1, "y")?;
            Ok(value(x - y))
        })
    }

    fn num(args: &Resolved, index: usize, name: &str) -> anyhow::Result<i64> {
        if let Ok(v) = args.arg::<i64>(index) {
            return Ok(*v);
        }
        args.kwarg::<i64>(name).map(|v| *v)
    }

    fn sample_context() -> Context {
        let mut context = Context::new();
        context.put("a", 2i64);
        context.put("b", 2i64);
        context
    }

    /// The add/mul/sub task list shared by the workflow tests.
    fn sample_items() -> Vec<Arc<dyn Invoke>> {
        vec![
            Arc::new(Task::new(
                add(),
                Signature::new([Arg::lookup("a")]).kwarg("y", Arg::value(10i64)),
                Key::from("add_result"),
            )),
            Arc::new(Task::new(
                mul(),
                Signature::default()
                    .kwarg("x", Arg::value(2i64))
                    .kwarg("y", Arg::lookup("a")),
                Key::from("mul_result"),
            )),
            Arc::new(Task::new(
                sub(),
                Signature::new([Arg::lookup("add_result"), Arg::lookup("mul_result")]),
                Key::from("sub_result"),
            )),
        ]
    }

    #[test]
    fn sequence_runs_items_in_order() {
        let mut context = sample_context();
        let workflow = Workflow::new(sample_items());

        let out = workflow.invoke(&mut context).unwrap().unwrap();
        assert_eq!(context.get_as::<i64>("add_result"), Some(&12));
        assert_eq!(context.get_as::<i64>("mul_result"), Some(&4));
        assert_eq!(context.get_as::<i64>("sub_result"), Some(&8));

        // The last item's result is what the workflow returns.
        assert_eq!(out.downcast_ref::<i64>(), Some(&8));
    }

    #[test]
    fn empty_workflow_returns_none() {
        let mut context = sample_context();
        let workflow = Workflow::new(Vec::new());

        let out = workflow.invoke(&mut context).unwrap();
        assert!(out.is_none());
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn workflow_nests_in_workflow() {
        let mut context = sample_context();
        let inner = Workflow::new(vec![
            Arc::new(Task::new(
                add(),
                Signature::new([Arg::value(2i64), Arg::value(2i64)]),
                Key::from("add"),
            )) as Arc<dyn Invoke>,
            Arc::new(Task::new(
                mul(),
                Signature::new([Arg::value(3i64), Arg::value(3i64)]),
                Key::from("mul"),
            )),
        ]);
        let outer = Workflow::new(vec![
            Arc::new(inner) as Arc<dyn Invoke>,
            Arc::new(Task::new(
                sub(),
                Signature::new([Arg::lookup("mul"), Arg::lookup("add")]),
                Key::from("sub"),
            )),
        ]);

        outer.invoke(&mut context).unwrap();
        assert_eq!(context.get_as::<i64>("sub"), Some(&5));
    }

    #[test]
    fn closure_steps_seed_the_context() {
        // A hand-built chain: a seeding step, then tasks that each read the
        // running value from "_prev" and overwrite it.
        let chained = |func: TaskFn, n: i64| -> Arc<dyn Invoke> {
            Arc::new(Task::new(
                func,
                Signature::new([Arg::lookup("_prev"), Arg::value(n)]),
                Key::from("_prev"),
            ))
        };

        let workflow = Workflow::new(vec![
            step(|context: &mut Context| {
                context.put("_prev", 10i64);
                Ok(None)
            }),
            chained(add(), 2),
            chained(mul(), 3),
            chained(sub(), 35),
        ]);

        let mut context = sample_context();
        workflow.invoke(&mut context).unwrap();
        assert_eq!(context.get_as::<i64>("_prev"), Some(&1));
    }

    #[test]
    fn fold_chains_through_put_to() {
        let mut context = sample_context();
        let pipeline = Pipeline::new(
            vec![
                Arc::new(Task::new(
                    add(),
                    Signature::new([Arg::lookup("start"), Arg::value(2i64)]),
                    None,
                )) as Arc<dyn Invoke>,
                Arc::new(Task::new(
                    mul(),
                    Signature::new([Arg::lookup("_prev"), Arg::value(2i64)]),
                    None,
                )),
                Arc::new(Task::new(
                    sub(),
                    Signature::new([Arg::lookup("_prev"), Arg::value(7i64)]),
                    None,
                )),
                Arc::new(Task::new(
                    add(),
                    Signature::new([Arg::lookup("_prev"), Arg::value(4i64)]),
                    None,
                )),
            ],
            "_prev",
        )
        .alias("a", "start")
        .returning("_prev");

        let out = pipeline.invoke(&mut context).unwrap().unwrap();
        assert_eq!(out.downcast_ref::<i64>(), Some(&5));

        // 2 -> +2 -> *2 -> -7 -> +4, folded left to right.
        assert_eq!(context.get_as::<i64>("_prev"), Some(&5));
        assert_eq!(context.get_as::<i64>("start"), Some(&2));
    }

    #[test]
    fn empty_pipeline_only_seeds_and_reads() {
        let mut context = sample_context();
        let pipeline = Pipeline::new(Vec::new(), "_prev")
            .alias("a", "start")
            .returning("start");

        let out = pipeline.invoke(&mut context).unwrap().unwrap();
        assert_eq!(out.downcast_ref::<i64>(), Some(&2));
        assert!(!context.contains("_prev"));
    }

    #[test]
    fn pipeline_without_return_key_returns_none() {
        let mut context = sample_context();
        let pipeline = Pipeline::new(
            vec![Arc::new(Task::new(
                add(),
                Signature::new([Arg::lookup("a"), Arg::value(1i64)]),
                None,
            )) as Arc<dyn Invoke>],
            "_prev",
        );

        let out = pipeline.invoke(&mut context).unwrap();
        assert!(out.is_none());
        assert_eq!(context.get_as::<i64>("_prev"), Some(&3));
    }

    #[test]
    fn duplicate_alias_destination_keeps_last_write() {
        let mut context = sample_context();
        context.put("b", 7i64);
        let pipeline = Pipeline::new(Vec::new(), "_prev")
            .alias("a", "x")
            .alias("b", "x");

        pipeline.invoke(&mut context).unwrap();
        assert_eq!(context.get_as::<i64>("x"), Some(&7));
    }

    #[test]
    fn missing_alias_source_fails() {
        let mut context = Context::new();
        let pipeline = Pipeline::new(Vec::new(), "_prev").alias("ghost", "x");

        let err = pipeline.invoke(&mut context).unwrap_err();
        assert!(matches!(err, KeyflowError::KeyNotFound(_)));
        assert!(!context.contains("x"));
    }

    #[test]
    fn missing_return_key_fails() {
        let mut context = Context::new();
        let pipeline = Pipeline::new(Vec::new(), "_prev").returning("_prev");

        let err = pipeline.invoke(&mut context).unwrap_err();
        assert!(matches!(err, KeyflowError::KeyNotFound(_)));
    }
}
