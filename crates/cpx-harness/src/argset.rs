use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use cpx_host::Value;

/// Ordered, fixed-arity argument tuple for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ArgumentSet(Vec<Value>);

impl ArgumentSet {
    pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
        Self(values.into_iter().collect())
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// The host tuple handed to the wrapper as `args`.
    pub fn to_tuple(&self) -> Value {
        Value::Tuple(self.0.clone())
    }
}

impl From<Vec<Value>> for ArgumentSet {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl fmt::Display for ArgumentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tuple())
    }
}

type GenerateFn = dyn Fn() -> Vec<ArgumentSet> + Send + Sync;

/// Restartable source of argument tuples: every call to
/// [`ArgumentGenerator::generate`] re-runs the generator from the start.
#[derive(Clone)]
pub struct ArgumentGenerator(Arc<GenerateFn>);

impl ArgumentGenerator {
    pub fn new(f: impl Fn() -> Vec<ArgumentSet> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A generator that always yields `sets`.
    pub fn fixed(sets: Vec<ArgumentSet>) -> Self {
        Self::new(move || sets.clone())
    }

    pub fn generate(&self) -> Vec<ArgumentSet> {
        (self.0)()
    }
}

impl fmt::Debug for ArgumentGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArgumentGenerator(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_restarts() {
        let g = ArgumentGenerator::fixed(vec![
            ArgumentSet::new([Value::str("hello")]),
            ArgumentSet::new([Value::str("byteorder")]),
        ]);
        assert_eq!(g.generate(), g.generate());
        assert_eq!(g.generate()[1].to_string(), "('byteorder',)");
    }
}
