//! Stock actors
//!
//! Small building blocks for assembling networks in code and in tests.

use std::sync::{Arc, Mutex};

use crate::actor::{Actor, FiringContext, Inputs, PortSpec};
use crate::error::{Error, Result};
use crate::types::Value;

/// Strict source asserting the same value every instant on `out`.
pub struct Const {
    value: Value,
    firing_limit: Option<u64>,
    commits: u64,
}

impl Const {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            firing_limit: None,
            commits: 0,
        }
    }

    /// Exclude the actor after `limit` committed instants.
    pub fn with_firing_limit(mut self, limit: u64) -> Self {
        self.firing_limit = Some(limit);
        self
    }
}

impl Actor for Const {
    fn ports(&self) -> PortSpec {
        PortSpec::new().output("out")
    }

    fn initialize(&mut self) -> Result<()> {
        self.commits = 0;
        Ok(())
    }

    fn evaluate(&mut self, firing: &mut FiringContext<'_>) -> Result<()> {
        firing.assert_present(0, self.value.clone())
    }

    fn commit(&mut self, _inputs: &Inputs<'_>) -> Result<bool> {
        self.commits += 1;
        Ok(self.firing_limit.is_none_or(|limit| self.commits < limit))
    }
}

type UnaryFn = Box<dyn Fn(&Value) -> Option<Value>>;
type BinaryFn = Box<dyn Fn(Option<&Value>, Option<&Value>) -> Option<Value>>;

/// Strict unary function from `in` to `out`. An absent input produces an
/// absent output; so does a function result of `None`.
pub struct Map {
    f: UnaryFn,
}

impl Map {
    pub fn new(f: impl Fn(&Value) -> Option<Value> + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    /// Integer addition; non-integer inputs and overflow produce absence.
    pub fn add(n: i64) -> Self {
        Self::new(move |v| v.as_integer()?.checked_add(n).map(Value::Integer))
    }

    /// Integer multiplication; non-integer inputs and overflow produce
    /// absence.
    pub fn scale(n: i64) -> Self {
        Self::new(move |v| v.as_integer()?.checked_mul(n).map(Value::Integer))
    }
}

impl Actor for Map {
    fn ports(&self) -> PortSpec {
        PortSpec::new().input("in").output("out")
    }

    fn evaluate(&mut self, firing: &mut FiringContext<'_>) -> Result<()> {
        let out = firing.read(0)?.and_then(|v| (self.f)(&v));
        firing.assert_option(0, out)
    }
}

/// Strict binary function from `a` and `b` to `out`. The function sees
/// absent inputs as `None` and decides presence itself.
pub struct Zip2 {
    f: BinaryFn,
}

impl Zip2 {
    pub fn new(f: impl Fn(Option<&Value>, Option<&Value>) -> Option<Value> + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    /// Integer sum, present only when both inputs are present integers and
    /// the sum does not overflow.
    pub fn sum() -> Self {
        Self::new(|a, b| {
            let (x, y) = (a?.as_integer()?, b?.as_integer()?);
            x.checked_add(y).map(Value::Integer)
        })
    }
}

impl Actor for Zip2 {
    fn ports(&self) -> PortSpec {
        PortSpec::new().input("a").input("b").output("out")
    }

    fn evaluate(&mut self, firing: &mut FiringContext<'_>) -> Result<()> {
        let a = firing.read(0)?;
        let b = firing.read(1)?;
        let out = (self.f)(a.as_ref(), b.as_ref());
        firing.assert_option(0, out)
    }
}

/// Non-strict one-instant delay: emits on `out` what `in` carried in the
/// previous instant, without looking at the current input.
///
/// Absent on the first instant unless built [`with_initial`](Pre::with_initial).
#[derive(Debug, Default)]
pub struct Pre {
    initial: Option<Value>,
    held: Option<Value>,
}

impl Pre {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial(value: impl Into<Value>) -> Self {
        let initial = Some(value.into());
        Self {
            held: initial.clone(),
            initial,
        }
    }
}

impl Actor for Pre {
    fn ports(&self) -> PortSpec {
        PortSpec::new().input("in").output("out")
    }

    fn is_non_strict(&self) -> bool {
        true
    }

    fn is_fire_functional(&self) -> bool {
        false
    }

    fn initialize(&mut self) -> Result<()> {
        self.held = self.initial.clone();
        Ok(())
    }

    fn evaluate(&mut self, firing: &mut FiringContext<'_>) -> Result<()> {
        firing.assert_option(0, self.held.clone())
    }

    fn commit(&mut self, inputs: &Inputs<'_>) -> Result<bool> {
        // An input left unknown by the instant is held as absent.
        self.held = inputs.read(0).ok().flatten().cloned();
        Ok(true)
    }
}

/// Non-strict constant on `out` that ignores its `in` port. Closes
/// feedback loops with a fixed value.
pub struct Seed {
    value: Value,
}

impl Seed {
    pub fn new(value: impl Into<Value>) -> Self {
        Self { value: value.into() }
    }
}

impl Actor for Seed {
    fn ports(&self) -> PortSpec {
        PortSpec::new().input("in").output("out")
    }

    fn is_non_strict(&self) -> bool {
        true
    }

    fn evaluate(&mut self, firing: &mut FiringContext<'_>) -> Result<()> {
        firing.assert_present(0, self.value.clone())
    }
}

/// Shared log written by a [`Recorder`], one entry per committed instant.
#[derive(Debug, Clone, Default)]
pub struct RecorderLog(Arc<Mutex<Vec<Option<Value>>>>);

impl RecorderLog {
    /// Copy of the entries recorded so far
    pub fn entries(&self) -> Vec<Option<Value>> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strict sink recording the value of `in` at every commit.
pub struct Recorder {
    log: RecorderLog,
}

impl Recorder {
    pub fn new() -> (Self, RecorderLog) {
        let log = RecorderLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl Actor for Recorder {
    fn ports(&self) -> PortSpec {
        PortSpec::new().input("in")
    }

    fn evaluate(&mut self, _firing: &mut FiringContext<'_>) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self, inputs: &Inputs<'_>) -> Result<bool> {
        let value = inputs.read(0)?.cloned();
        self.log
            .0
            .lock()
            .map_err(|_| Error::actor("recorder", "log lock poisoned"))?
            .push(value);
        Ok(true)
    }
}

type EvaluateFn = Box<dyn FnMut(&mut FiringContext<'_>) -> Result<()>>;
type CommitFn = Box<dyn FnMut(&Inputs<'_>) -> Result<bool>>;

/// Actor backed by closures, for one-off behaviors.
pub struct FnActor {
    spec: PortSpec,
    non_strict: bool,
    evaluate: EvaluateFn,
    commit: Option<CommitFn>,
}

impl FnActor {
    pub fn new(spec: PortSpec, evaluate: impl FnMut(&mut FiringContext<'_>) -> Result<()> + 'static) -> Self {
        Self {
            spec,
            non_strict: false,
            evaluate: Box::new(evaluate),
            commit: None,
        }
    }

    pub fn non_strict(mut self) -> Self {
        self.non_strict = true;
        self
    }

    pub fn on_commit(mut self, commit: impl FnMut(&Inputs<'_>) -> Result<bool> + 'static) -> Self {
        self.commit = Some(Box::new(commit));
        self
    }
}

impl Actor for FnActor {
    fn ports(&self) -> PortSpec {
        self.spec.clone()
    }

    fn is_non_strict(&self) -> bool {
        self.non_strict
    }

    fn evaluate(&mut self, firing: &mut FiringContext<'_>) -> Result<()> {
        (self.evaluate)(firing)
    }

    fn commit(&mut self, inputs: &Inputs<'_>) -> Result<bool> {
        match &mut self.commit {
            Some(commit) => commit(inputs),
            None => Ok(true),
        }
    }
}
